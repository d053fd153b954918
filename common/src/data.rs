// Structured protocol messages exchanged between a client and the data
// service. These are already-decoded values; no wire encoding lives here.

use crate::serializer::{bytes_str, opt_bytes_str, vec_bytes_str};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One side of a row range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowBound {
    Closed(#[serde(with = "bytes_str")] Vec<u8>),
    Open(#[serde(with = "bytes_str")] Vec<u8>),
}

impl RowBound {
    pub fn closed(key: impl Into<Vec<u8>>) -> Self {
        Self::Closed(key.into())
    }

    pub fn open(key: impl Into<Vec<u8>>) -> Self {
        Self::Open(key.into())
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Self::Closed(k) | Self::Open(k) => k,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

/// Contiguous key range; a missing bound is unbounded on that side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RowRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<RowBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<RowBound>,
}

impl RowRange {
    pub fn new(start: Option<RowBound>, end: Option<RowBound>) -> Self {
        Self { start, end }
    }

    /// Whole keyspace
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn closed(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Some(RowBound::Closed(start.into())),
            Some(RowBound::Closed(end.into())),
        )
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// True if every key of the range sorts strictly before `key`
    pub fn ends_before(&self, key: &[u8]) -> bool {
        match &self.end {
            None => false,
            Some(RowBound::Closed(end)) => end.as_slice() < key,
            Some(RowBound::Open(end)) => end.as_slice() <= key,
        }
    }

    /// True if every key of the range sorts strictly after `key`
    pub fn starts_after(&self, key: &[u8]) -> bool {
        match &self.start {
            None => false,
            Some(RowBound::Closed(start)) => start.as_slice() > key,
            Some(RowBound::Open(start)) => start.as_slice() >= key,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            None => true,
            Some(RowBound::Closed(start)) => key >= start.as_slice(),
            Some(RowBound::Open(start)) => key > start.as_slice(),
        };
        let before_end = match &self.end {
            None => true,
            Some(RowBound::Closed(end)) => key <= end.as_slice(),
            Some(RowBound::Open(end)) => key < end.as_slice(),
        };
        after_start && before_end
    }
}

/// Selection of individual keys and ranges. Empty means the full table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSet {
    #[serde(default, with = "vec_bytes_str", skip_serializing_if = "Vec::is_empty")]
    pub row_keys: Vec<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_ranges: Vec<RowRange>,
}

impl RowSet {
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        Self {
            row_keys: keys.into_iter().map(Into::into).collect(),
            row_ranges: Vec::new(),
        }
    }

    pub fn from_ranges(ranges: Vec<RowRange>) -> Self {
        Self {
            row_keys: Vec::new(),
            row_ranges: ranges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty() && self.row_ranges.is_empty()
    }

    /// Full scan, either spelled as an empty set or as one unbounded range
    pub fn is_full_scan(&self) -> bool {
        self.row_keys.is_empty() && self.row_ranges.iter().all(RowRange::is_unbounded)
    }
}

/// Column selection carried on a read. The emulator never evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, with = "opt_bytes_str", skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells_per_column_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadRowsRequest {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_profile_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<RowSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RowFilter>,
    /// Zero means no limit
    #[serde(default)]
    pub rows_limit: i64,
    #[serde(default)]
    pub reversed: bool,
}

impl ReadRowsRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_rows(mut self, rows: RowSet) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_limit(mut self, rows_limit: i64) -> Self {
        self.rows_limit = rows_limit;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    /// Row ranges of the selection, empty for a full scan
    pub fn row_ranges(&self) -> &[RowRange] {
        self.rows.as_ref().map(|r| r.row_ranges.as_slice()).unwrap_or(&[])
    }

    /// Ordering required between consecutive row keys for this scan
    pub fn key_order(&self) -> Ordering {
        if self.reversed {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

/// One streamed fragment of a row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellChunk {
    /// Empty when continuing the current row
    #[serde(default, with = "bytes_str")]
    pub row_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, with = "opt_bytes_str", skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<Vec<u8>>,
    #[serde(default)]
    pub timestamp_micros: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, with = "bytes_str")]
    pub value: Vec<u8>,
    /// Non-zero when the cell value is split and more chunks follow
    #[serde(default)]
    pub value_size: i32,
    #[serde(default)]
    pub reset_row: bool,
    #[serde(default)]
    pub commit_row: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadRowsResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<CellChunk>,
    /// Progress marker sent without data, e.g. when rows were filtered out
    #[serde(default, with = "bytes_str", skip_serializing_if = "Vec::is_empty")]
    pub last_scanned_row_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    SetCell {
        family_name: String,
        #[serde(with = "bytes_str")]
        column_qualifier: Vec<u8>,
        timestamp_micros: i64,
        #[serde(with = "bytes_str")]
        value: Vec<u8>,
    },
    DeleteFromColumn {
        family_name: String,
        #[serde(with = "bytes_str")]
        column_qualifier: Vec<u8>,
    },
    DeleteFromFamily {
        family_name: String,
    },
    DeleteFromRow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEntry {
    #[serde(with = "bytes_str")]
    pub row_key: Vec<u8>,
    pub mutations: Vec<Mutation>,
}

impl MutationEntry {
    /// Single `SetCell` entry with a fixed family, qualifier and timestamp
    pub fn set_cell(row_key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            row_key: row_key.into(),
            mutations: vec![Mutation::SetCell {
                family_name: "f".to_string(),
                column_qualifier: b"col".to_vec(),
                timestamp_micros: 1000,
                value: value.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutateRowsRequest {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_profile_id: String,
    pub entries: Vec<MutationEntry>,
}

impl MutateRowsRequest {
    pub fn new(table_name: impl Into<String>, entries: Vec<MutationEntry>) -> Self {
        Self {
            table_name: table_name.into(),
            app_profile_id: String::new(),
            entries,
        }
    }
}

/// Per-entry result; `index` refers to the request being answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub index: i64,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutateRowsResponse {
    pub entries: Vec<ResponseEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub timestamp_micros: i64,
    #[serde(with = "bytes_str")]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(with = "bytes_str")]
    pub qualifier: Vec<u8>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub name: String,
    pub columns: Vec<Column>,
}

/// A fully materialized row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    #[serde(with = "bytes_str")]
    pub key: Vec<u8>,
    pub families: Vec<Family>,
}

impl Row {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            families: Vec::new(),
        }
    }

    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Append a cell, reusing the last family/column when the names match
    pub fn push_cell(&mut self, family: &str, qualifier: &[u8], cell: Cell) {
        let needs_family = self.families.last().map_or(true, |f| f.name != family);
        if needs_family {
            self.families.push(Family {
                name: family.to_string(),
                columns: Vec::new(),
            });
        }
        // Just pushed or matched above
        let Some(fam) = self.families.last_mut() else {
            return;
        };
        let needs_column = fam.columns.last().map_or(true, |c| c.qualifier != qualifier);
        if needs_column {
            fam.columns.push(Column {
                qualifier: qualifier.to_vec(),
                cells: Vec::new(),
            });
        }
        if let Some(col) = fam.columns.last_mut() {
            col.cells.push(cell);
        }
    }

    /// Value of the first cell in `family:qualifier`
    pub fn value(&self, family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.families
            .iter()
            .filter(|f| f.name == family)
            .flat_map(|f| f.columns.iter())
            .find(|c| c.qualifier == qualifier)
            .and_then(|c| c.cells.first())
            .map(|c| c.value.as_slice())
    }

    pub fn cell_count(&self) -> usize {
        self.families
            .iter()
            .flat_map(|f| f.columns.iter())
            .map(|c| c.cells.len())
            .sum()
    }
}
