// Chunk merging
//
// Rebuilds rows from the chunk stream of a read and enforces the key order of
// the scan direction. A row is only handed out once its commit chunk arrives.

use streamkv_common::{Cell, CellChunk, ReadRowsResponse, Row, Status};

#[derive(Debug)]
struct PendingCell {
    timestamp_micros: i64,
    labels: Vec<String>,
    value: Vec<u8>,
}

#[derive(Debug)]
struct PartialRow {
    row: Row,
    family: Option<String>,
    qualifier: Option<Vec<u8>>,
    cell: Option<PendingCell>,
}

impl PartialRow {
    fn new(key: Vec<u8>) -> Self {
        Self {
            row: Row::new(key),
            family: None,
            qualifier: None,
            cell: None,
        }
    }
}

#[derive(Debug)]
pub struct RowMerger {
    reversed: bool,
    last_key: Option<Vec<u8>>,
    partial: Option<PartialRow>,
}

impl RowMerger {
    pub fn new(reversed: bool) -> Self {
        Self {
            reversed,
            last_key: None,
            partial: None,
        }
    }

    /// Key of the last committed row or scanned marker, the resume point
    pub fn last_key(&self) -> Option<&[u8]> {
        self.last_key.as_deref()
    }

    pub fn has_partial_row(&self) -> bool {
        self.partial.is_some()
    }

    /// Forget the row in progress, used when a stream breaks mid-row
    pub fn discard_partial(&mut self) {
        self.partial = None;
    }

    /// Feed one response, returning the rows it completed
    pub fn push(&mut self, response: ReadRowsResponse) -> Result<Vec<Row>, Status> {
        let mut rows = Vec::new();
        for chunk in response.chunks {
            if let Some(row) = self.push_chunk(chunk)? {
                rows.push(row);
            }
        }
        if !response.last_scanned_row_key.is_empty() {
            if self.partial.is_some() {
                return Err(Status::internal(
                    "received last scanned row key while a row is in progress",
                ));
            }
            self.check_order(&response.last_scanned_row_key)?;
            self.last_key = Some(response.last_scanned_row_key);
        }
        Ok(rows)
    }

    /// A cleanly closed stream must not leave a row half built
    pub fn finish(&self) -> Result<(), Status> {
        if self.partial.is_some() {
            return Err(Status::internal("stream ended with an uncommitted row"));
        }
        Ok(())
    }

    fn check_order(&self, key: &[u8]) -> Result<(), Status> {
        let Some(last) = self.last_key.as_deref() else {
            return Ok(());
        };
        let in_order = if self.reversed { key < last } else { key > last };
        if in_order {
            return Ok(());
        }
        let direction = if self.reversed { "decreasing" } else { "increasing" };
        Err(Status::internal(format!(
            "row keys must be strictly {}: '{}' followed '{}'",
            direction,
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(last),
        )))
    }

    fn push_chunk(&mut self, chunk: CellChunk) -> Result<Option<Row>, Status> {
        if chunk.reset_row {
            if self.partial.take().is_none() {
                return Err(Status::internal("reset_row without a row in progress"));
            }
            return Ok(None);
        }

        if self.partial.is_none() {
            if chunk.row_key.is_empty() {
                return Err(Status::internal("first chunk of a row has no row key"));
            }
            self.check_order(&chunk.row_key)?;
            self.partial = Some(PartialRow::new(chunk.row_key.clone()));
        }
        let Some(partial) = self.partial.as_mut() else {
            return Ok(None);
        };
        if !chunk.row_key.is_empty() && chunk.row_key != partial.row.key {
            return Err(Status::internal("row key changed in the middle of a row"));
        }

        if let Some(family) = chunk.family_name {
            if chunk.qualifier.is_none() {
                return Err(Status::internal("new family without a qualifier"));
            }
            partial.family = Some(family);
        }
        if let Some(qualifier) = chunk.qualifier {
            if partial.family.is_none() {
                return Err(Status::internal("qualifier without a family"));
            }
            partial.qualifier = Some(qualifier);
        }

        match (&partial.family, &partial.qualifier) {
            (Some(family), Some(qualifier)) => {
                let cell = partial.cell.get_or_insert_with(|| PendingCell {
                    timestamp_micros: chunk.timestamp_micros,
                    labels: chunk.labels,
                    value: Vec::new(),
                });
                cell.value.extend_from_slice(&chunk.value);
                if chunk.value_size == 0 {
                    if let Some(done) = partial.cell.take() {
                        partial.row.push_cell(
                            family,
                            qualifier,
                            Cell {
                                timestamp_micros: done.timestamp_micros,
                                value: done.value,
                                labels: done.labels,
                            },
                        );
                    }
                }
            }
            _ if !chunk.value.is_empty() || chunk.value_size > 0 => {
                return Err(Status::internal("cell value without a family and qualifier"));
            }
            _ => {}
        }

        if !chunk.commit_row {
            return Ok(None);
        }
        if partial.cell.is_some() {
            return Err(Status::internal("commit_row in the middle of a split cell"));
        }
        let row = self.partial.take().map(|p| p.row);
        if let Some(row) = &row {
            self.last_key = Some(row.key.clone());
        }
        Ok(row)
    }
}
