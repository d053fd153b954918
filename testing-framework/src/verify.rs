//! Assertion helpers for conformance suites
//!
//! Each helper returns `anyhow::Result` with a message that says what was
//! expected and what was observed, so suites can chain them with `?`.

use crate::driver::OperationResult;
use crate::emulator::{ReadRowsRecord, RequestRecord};
use anyhow::{Context, Result};
use std::time::Duration;
use streamkv_common::metadata::{has_client_identity, routing_cookies_of};
use streamkv_common::{Code, MetadataMap, RequestParams, RowBound, Status};

/// Assert that an operation completed with OK
///
/// # Example
///
/// ```rust,ignore
/// check_ok(&driver.run_one(submission, &options).await)?;
/// ```
pub fn check_ok(result: &OperationResult) -> Result<()> {
    let status = result.status();
    if !status.is_ok() {
        anyhow::bail!("{} operation failed: {}", result.kind(), status);
    }
    Ok(())
}

/// Assert that an operation either completed or was cancelled by a shutdown
pub fn check_ok_or_cancelled(result: &OperationResult) -> Result<()> {
    match result.code() {
        Code::Ok | Code::Cancelled => Ok(()),
        _ => anyhow::bail!(
            "{} operation should be OK or cancelled, got {}",
            result.kind(),
            result.status()
        ),
    }
}

/// Assert that all records arrived within `skew` of each other
pub fn check_requests_within<R>(records: &[RequestRecord<R>], skew: Duration) -> Result<()> {
    let (Some(first), Some(last)) = (
        records.iter().map(|r| r.received_at).min(),
        records.iter().map(|r| r.received_at).max(),
    ) else {
        return Ok(());
    };
    let spread = last - first;
    if spread > skew {
        anyhow::bail!(
            "{} requests arrived over {:?}, expected within {:?}",
            records.len(),
            spread,
            skew
        );
    }
    Ok(())
}

/// Assert that consecutive records are at least `min` apart
pub fn check_inter_arrival_at_least<R>(records: &[RequestRecord<R>], min: Duration) -> Result<()> {
    for (i, pair) in records.windows(2).enumerate() {
        let gap = pair[1].received_at.saturating_duration_since(pair[0].received_at);
        if gap < min {
            anyhow::bail!(
                "Requests #{} and #{} are {:?} apart, expected at least {:?}",
                i,
                i + 1,
                gap,
                min
            );
        }
    }
    Ok(())
}

/// Assert that a read failed because keys arrived out of scan order
pub fn check_ordering_violation(status: &Status, reversed: bool) -> Result<()> {
    if status.is_ok() {
        anyhow::bail!("Expected an ordering error, the read succeeded");
    }
    let wording = if reversed { "decreasing" } else { "increasing" };
    if !status.message.contains(wording) {
        anyhow::bail!(
            "Ordering error should mention '{}', got: {}",
            wording,
            status.message
        );
    }
    Ok(())
}

/// Assert a deadline failure, by code or by a message naming it
pub fn check_deadline_exceeded(status: &Status) -> Result<()> {
    if status.code == Code::DeadlineExceeded {
        return Ok(());
    }
    let normalized: String = status
        .message
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if normalized.contains("deadlineexceeded") {
        return Ok(());
    }
    anyhow::bail!("Expected deadline exceeded, got {}", status)
}

/// Routing cookie a request echoed under `header`
pub fn routing_cookie_in<R>(record: &RequestRecord<R>, header: &str) -> Option<String> {
    routing_cookies_of(&record.metadata)
        .get(header)
        .map(str::to_string)
}

/// Start bound of the first range of a recorded read
pub fn resume_start(record: &ReadRowsRecord) -> Option<RowBound> {
    record
        .request
        .row_ranges()
        .first()
        .and_then(|range| range.start.clone())
}

/// End bound of the first range of a recorded read
pub fn resume_end(record: &ReadRowsRecord) -> Option<RowBound> {
    record
        .request
        .row_ranges()
        .first()
        .and_then(|range| range.end.clone())
}

/// Assert that a call carried client identity and routed to `table` under
/// `app_profile_id`
pub fn check_client_headers(
    metadata: &MetadataMap,
    table_name: &str,
    app_profile_id: &str,
) -> Result<()> {
    if !has_client_identity(metadata) {
        anyhow::bail!("Call carries neither user-agent nor x-goog-api-client");
    }
    let params = RequestParams::decode(metadata).context("Failed to decode request params")?;
    if !params.targets(table_name) {
        anyhow::bail!(
            "Request params '{}' do not name table {}",
            params.raw,
            table_name
        );
    }
    let sent_profile = params.app_profile_id.as_deref().unwrap_or_default();
    if sent_profile != app_profile_id {
        anyhow::bail!(
            "App profile mismatch: expected '{}', got '{}'",
            app_profile_id,
            sent_profile
        );
    }
    Ok(())
}
