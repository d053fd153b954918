// File: testing-framework/src/emulator/stream.rs
//
// Turns scripted chunks into read responses. Chunks of a row are held back
// until the row's boundary so a response never carries half a row: Commit
// flushes them with `commit_row` on the last chunk, Drop discards them and
// reports the key as scanned.

use crate::emulator::model::{ChunkStatus, RowChunk};
use streamkv_common::{CellChunk, ReadRowsResponse};

#[derive(Debug, Default)]
pub struct ChunkBuffer {
    pending: Vec<RowChunk>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks still waiting for their boundary
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed one scripted chunk, returning a response when it closes a row
    pub fn push(&mut self, chunk: &RowChunk) -> Option<ReadRowsResponse> {
        match chunk.status {
            ChunkStatus::Continue => {
                self.pending.push(chunk.clone());
                None
            }
            ChunkStatus::Drop => {
                self.take_row(&chunk.row_key);
                Some(ReadRowsResponse {
                    chunks: Vec::new(),
                    last_scanned_row_key: chunk.row_key.clone(),
                })
            }
            ChunkStatus::Commit => {
                let mut chunks: Vec<CellChunk> = self
                    .take_row(&chunk.row_key)
                    .iter()
                    .chain(std::iter::once(chunk))
                    .map(to_cell_chunk)
                    .collect();
                if let Some(last) = chunks.last_mut() {
                    last.commit_row = true;
                }
                Some(ReadRowsResponse {
                    chunks,
                    last_scanned_row_key: Vec::new(),
                })
            }
        }
    }

    fn take_row(&mut self, key: &[u8]) -> Vec<RowChunk> {
        let (row, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|c| c.row_key == key);
        self.pending = rest;
        row
    }
}

fn to_cell_chunk(chunk: &RowChunk) -> CellChunk {
    CellChunk {
        row_key: chunk.row_key.clone(),
        family_name: Some(chunk.family_name.clone()),
        qualifier: Some(chunk.qualifier.clone()),
        value: chunk.value.clone(),
        ..Default::default()
    }
}
