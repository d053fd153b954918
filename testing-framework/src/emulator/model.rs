// File: testing-framework/src/emulator/model.rs
//
// Scripted Model
//
// What a test author writes down: rows as chunk lists for reads, per-entry
// outcome tables for writes, and the emit/fail actions the server plays per
// attempt. `materialize` is the oracle for what a conforming client must
// produce from a chunk list.

use crate::error::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use streamkv_common::serializer::{bytes_str, opt_duration_ms};
use streamkv_common::{Cell, Code, ResponseEntry, Row, Status};

/// Boundary marker carried by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// More chunks of this row follow
    #[default]
    Continue,
    /// Last chunk; the row is complete
    Commit,
    /// Abandon everything accumulated for this key
    Drop,
}

/// One scripted cell fragment of a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChunk {
    #[serde(with = "bytes_str")]
    pub row_key: Vec<u8>,
    pub family_name: String,
    #[serde(with = "bytes_str")]
    pub qualifier: Vec<u8>,
    #[serde(with = "bytes_str")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub status: ChunkStatus,
}

impl RowChunk {
    /// Chunk in family `f`, column `col`
    pub fn new(row_key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, status: ChunkStatus) -> Self {
        Self {
            row_key: row_key.into(),
            family_name: "f".to_string(),
            qualifier: b"col".to_vec(),
            value: value.into(),
            status,
        }
    }

    pub fn commit(row_key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(row_key, value, ChunkStatus::Commit)
    }

    pub fn drop_row(row_key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(row_key, value, ChunkStatus::Drop)
    }

    pub fn partial(row_key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(row_key, value, ChunkStatus::Continue)
    }

    pub fn with_column(mut self, family_name: &str, qualifier: impl Into<Vec<u8>>) -> Self {
        self.family_name = family_name.to_string();
        self.qualifier = qualifier.into();
        self
    }
}

/// Outcome table of a bulk write: succeeded indices plus failed indices per code
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryOutcomes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub succeeded: Vec<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<Code, Vec<usize>>,
}

impl EntryOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.succeeded.extend(indices);
        self
    }

    pub fn failed(mut self, code: Code, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failed.entry(code).or_default().extend(indices);
        self
    }

    /// No index mentioned at all
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.values().all(Vec::is_empty)
    }

    /// Response entries for every mentioned index, ascending
    pub fn response_entries(&self) -> Vec<ResponseEntry> {
        let mut entries: Vec<ResponseEntry> = self
            .succeeded
            .iter()
            .map(|&i| (i, Status::ok()))
            .chain(self.failed.iter().flat_map(|(code, indices)| {
                indices
                    .iter()
                    .map(move |&i| (i, Status::new(*code, format!("entry failed with {}", code))))
            }))
            .map(|(index, status)| ResponseEntry {
                index: index as i64,
                status,
            })
            .collect();
        entries.sort_by_key(|e| e.index);
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitPayload {
    Chunks(Vec<RowChunk>),
    Entries(EntryOutcomes),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitAction {
    pub payload: EmitPayload,
    #[serde(default, with = "opt_duration_ms", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
    /// Write path only: close the stream cleanly after this batch
    #[serde(default)]
    pub end_of_stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailAction {
    pub code: Code,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_cookie: Option<String>,
    #[serde(default, with = "opt_duration_ms", skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Duration>,
    #[serde(default, with = "opt_duration_ms", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

/// One step the server plays for a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedAction {
    Emit(EmitAction),
    Fail(FailAction),
}

impl ScriptedAction {
    /// Read-path emission of `chunks`
    pub fn chunks(chunks: Vec<RowChunk>) -> Self {
        Self::Emit(EmitAction {
            payload: EmitPayload::Chunks(chunks),
            delay: None,
            end_of_stream: false,
        })
    }

    /// Write-path emission of one response batch
    pub fn entries(outcomes: EntryOutcomes) -> Self {
        Self::Emit(EmitAction {
            payload: EmitPayload::Entries(outcomes),
            delay: None,
            end_of_stream: false,
        })
    }

    pub fn fail(code: Code) -> Self {
        Self::Fail(FailAction {
            code,
            message: None,
            routing_cookie: None,
            retry_delay: None,
            delay: None,
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        match &mut self {
            Self::Emit(emit) => emit.delay = Some(delay),
            Self::Fail(fail) => fail.delay = Some(delay),
        }
        self
    }

    /// No effect on fail actions or on read emissions
    pub fn end_of_stream(mut self) -> Self {
        if let Self::Emit(emit) = &mut self {
            emit.end_of_stream = true;
        }
        self
    }

    pub fn with_routing_cookie(mut self, cookie: impl Into<String>) -> Self {
        if let Self::Fail(fail) = &mut self {
            fail.routing_cookie = Some(cookie.into());
        }
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        if let Self::Fail(fail) = &mut self {
            fail.retry_delay = Some(retry_delay);
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Self::Fail(fail) = &mut self {
            fail.message = Some(message.into());
        }
        self
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Emit(emit) => emit.delay,
            Self::Fail(fail) => fail.delay,
        }
    }

    /// Method an emission payload belongs to; fail actions fit both
    pub fn payload_method(&self) -> Option<Method> {
        match self {
            Self::Emit(EmitAction {
                payload: EmitPayload::Chunks(_),
                ..
            }) => Some(Method::ReadRows),
            Self::Emit(EmitAction {
                payload: EmitPayload::Entries(_),
                ..
            }) => Some(Method::MutateRows),
            Self::Fail(_) => None,
        }
    }
}

/// Rows a conforming client reconstructs from `chunks`: one per Commit,
/// holding the cells accumulated for that key since its last boundary.
pub fn materialize(chunks: &[RowChunk]) -> Vec<Row> {
    let mut pending: Vec<&RowChunk> = Vec::new();
    let mut rows = Vec::new();
    for chunk in chunks {
        match chunk.status {
            ChunkStatus::Continue => pending.push(chunk),
            ChunkStatus::Drop => pending.retain(|c| c.row_key != chunk.row_key),
            ChunkStatus::Commit => {
                let mut row = Row::new(chunk.row_key.clone());
                for cell in pending
                    .iter()
                    .filter(|c| c.row_key == chunk.row_key)
                    .chain(std::iter::once(&chunk))
                {
                    row.push_cell(
                        &cell.family_name,
                        &cell.qualifier,
                        Cell {
                            timestamp_micros: 0,
                            value: cell.value.clone(),
                            labels: Vec::new(),
                        },
                    );
                }
                pending.retain(|c| c.row_key != chunk.row_key);
                rows.push(row);
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_yields_one_row() {
        let rows = materialize(&[
            RowChunk::partial("a", "1"),
            RowChunk::commit("a", "2"),
            RowChunk::commit("b", "3"),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, b"a".to_vec());
        assert_eq!(rows[0].cell_count(), 2);
        assert_eq!(rows[1].value("f", b"col"), Some(b"3".as_slice()));
    }

    #[test]
    fn test_drop_discards_accumulated_chunks() {
        let rows = materialize(&[
            RowChunk::partial("a", "1"),
            RowChunk::drop_row("a", "2"),
            RowChunk::commit("a", "3"),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cell_count(), 1);
        assert!(materialize(&[RowChunk::drop_row("q", "v")]).is_empty());
    }

    #[test]
    fn test_unterminated_row_produces_nothing() {
        assert!(materialize(&[RowChunk::partial("a", "1")]).is_empty());
        assert!(materialize(&[]).is_empty());
    }

    #[test]
    fn test_entry_outcomes_are_sorted() {
        let outcomes = EntryOutcomes::new()
            .succeeded([3, 0])
            .failed(Code::PermissionDenied, [2, 1]);
        let entries = outcomes.response_entries();
        let indices: Vec<i64> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(entries[0].status.is_ok());
        assert_eq!(entries[1].status.code, Code::PermissionDenied);
    }

    #[test]
    fn test_action_builders_only_touch_their_variant() {
        let emit = ScriptedAction::chunks(vec![])
            .with_routing_cookie("c")
            .with_delay(Duration::from_secs(2));
        assert_eq!(emit.delay(), Some(Duration::from_secs(2)));
        assert_eq!(emit.payload_method(), Some(Method::ReadRows));

        let fail = ScriptedAction::fail(Code::Aborted)
            .with_routing_cookie("c")
            .with_retry_delay(Duration::from_secs(2));
        match fail {
            ScriptedAction::Fail(f) => {
                assert_eq!(f.routing_cookie.as_deref(), Some("c"));
                assert_eq!(f.retry_delay, Some(Duration::from_secs(2)));
            }
            ScriptedAction::Emit(_) => panic!("expected fail"),
        }
    }
}
