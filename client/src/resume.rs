// Read resumption
//
// After a transient failure the next attempt must only ask for what the
// caller has not seen yet: keys strictly past the resume point in the scan
// direction, and no more rows than are still owed.

use streamkv_common::{ReadRowsRequest, RowBound, RowRange, RowSet};

/// Request for the next attempt, `None` when nothing is left to read
pub fn resume_request(
    original: &ReadRowsRequest,
    last_key: Option<&[u8]>,
    rows_returned: i64,
) -> Option<ReadRowsRequest> {
    let mut next = original.clone();

    if original.rows_limit > 0 {
        let remaining = original.rows_limit - rows_returned;
        if remaining <= 0 {
            return None;
        }
        next.rows_limit = remaining;
    }

    let Some(key) = last_key else {
        return Some(next);
    };

    let rows = match &original.rows {
        Some(rows) if !rows.is_empty() => rows.clone(),
        _ => RowSet::from_ranges(vec![RowRange::unbounded()]),
    };
    let narrowed = if original.reversed {
        narrow_reverse(&rows, key)
    } else {
        narrow_forward(&rows, key)
    };
    if narrowed.is_empty() {
        return None;
    }
    next.rows = Some(narrowed);
    Some(next)
}

fn narrow_forward(rows: &RowSet, key: &[u8]) -> RowSet {
    let row_keys = rows
        .row_keys
        .iter()
        .filter(|k| k.as_slice() > key)
        .cloned()
        .collect();
    let row_ranges = rows
        .row_ranges
        .iter()
        .filter(|range| match &range.end {
            None => true,
            Some(end) => end.key() > key,
        })
        .map(|range| {
            let needs_new_start = match &range.start {
                None => true,
                Some(RowBound::Closed(start)) => start.as_slice() <= key,
                Some(RowBound::Open(start)) => start.as_slice() < key,
            };
            let mut range = range.clone();
            if needs_new_start {
                range.start = Some(RowBound::open(key));
            }
            range
        })
        .collect();
    RowSet {
        row_keys,
        row_ranges,
    }
}

fn narrow_reverse(rows: &RowSet, key: &[u8]) -> RowSet {
    let row_keys = rows
        .row_keys
        .iter()
        .filter(|k| k.as_slice() < key)
        .cloned()
        .collect();
    let row_ranges = rows
        .row_ranges
        .iter()
        .filter(|range| match &range.start {
            None => true,
            Some(start) => start.key() < key,
        })
        .map(|range| {
            let needs_new_end = match &range.end {
                None => true,
                Some(RowBound::Closed(end)) => end.as_slice() >= key,
                Some(RowBound::Open(end)) => end.as_slice() > key,
            };
            let mut range = range.clone();
            if needs_new_end {
                range.end = Some(RowBound::open(key));
            }
            range
        })
        .collect();
    RowSet {
        row_keys,
        row_ranges,
    }
}
