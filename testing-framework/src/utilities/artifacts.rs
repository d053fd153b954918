// File: testing-framework/src/utilities/artifacts.rs
//
// Failure Artifact Collection
//
// Captures what the scripted server saw and what the operations resolved to,
// so a failed conformance run can be inspected after the fact.

use crate::driver::OperationResult;
use crate::emulator::{RequestRecord, ScriptedServer};
use crate::error::Method;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use streamkv_common::{Code, MetadataMap};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

/// Environment variable naming the directory failure artifacts go to
pub const ARTIFACT_DIR_ENV: &str = "STREAMKV_ARTIFACT_DIR";

/// One inbound call as captured from a recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub method: Method,
    /// Milliseconds since the earliest captured call
    pub offset_ms: u64,
    pub request: serde_json::Value,
    pub metadata: MetadataMap,
}

/// How one logical operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub label: String,
    pub code: Code,
    pub message: String,
    /// Rows delivered by a read
    pub rows: usize,
    /// Failed entry indices of a write
    pub failed_entries: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMetadata {
    pub test_name: String,
    /// Script the server ran, if it came from a file
    pub script_name: Option<String>,
    /// RFC 3339 wall-clock time of collection
    pub timestamp: String,
    pub duration_ms: u64,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Complete failure artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestArtifact {
    pub metadata: TestMetadata,
    pub calls: Vec<RecordedCall>,
    pub outcomes: Vec<OutcomeRecord>,
    pub authoring_errors: Vec<String>,
    pub logs: Vec<LogEntry>,
}

/// Collects failure state over the course of a test
///
/// # Examples
///
/// ```rust,ignore
/// let mut collector = ArtifactCollector::new("read_rows_paused_scan");
/// let result = driver.run_one(submission, &options).await;
/// collector.capture_outcome("read", &result);
/// if let Err(e) = check_ok(&result) {
///     collector.capture_server(&server)?;
///     collector.set_failure_reason(format!("{:#}", e));
///     collector.save_to_env_dir().await?;
/// }
/// ```
pub struct ArtifactCollector {
    metadata: TestMetadata,
    calls: Vec<RecordedCall>,
    outcomes: Vec<OutcomeRecord>,
    authoring_errors: Vec<String>,
    logs: Vec<LogEntry>,
    start_time: std::time::Instant,
}

impl ArtifactCollector {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            metadata: TestMetadata {
                test_name: test_name.into(),
                script_name: None,
                timestamp: chrono::Utc::now().to_rfc3339(),
                duration_ms: 0,
                failure_reason: None,
            },
            calls: Vec::new(),
            outcomes: Vec::new(),
            authoring_errors: Vec::new(),
            logs: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn set_script_name(&mut self, name: impl Into<String>) {
        self.metadata.script_name = Some(name.into());
    }

    pub fn set_failure_reason(&mut self, reason: impl Into<String>) {
        self.metadata.failure_reason = Some(reason.into());
    }

    /// Snapshot both recorders and the latched authoring errors of `server`.
    /// Recorders are left untouched.
    pub fn capture_server(&mut self, server: &ScriptedServer) -> Result<()> {
        let reads = server.read_rows_recorder().snapshot();
        let writes = server.mutate_rows_recorder().snapshot();
        let origin = reads
            .iter()
            .map(|r| r.received_at)
            .chain(writes.iter().map(|r| r.received_at))
            .min();
        let Some(origin) = origin else {
            self.authoring_errors = authoring_errors(server);
            return Ok(());
        };

        let mut calls = Vec::with_capacity(reads.len() + writes.len());
        for record in &reads {
            calls.push(capture_call(Method::ReadRows, record, origin)?);
        }
        for record in &writes {
            calls.push(capture_call(Method::MutateRows, record, origin)?);
        }
        calls.sort_by_key(|c| c.offset_ms);

        self.calls = calls;
        self.authoring_errors = authoring_errors(server);
        Ok(())
    }

    pub fn capture_outcome(&mut self, label: impl Into<String>, result: &OperationResult) {
        let status = result.status();
        self.outcomes.push(OutcomeRecord {
            label: label.into(),
            code: status.code,
            message: status.message.clone(),
            rows: result.rows().len(),
            failed_entries: result.failed_indices(),
        });
    }

    pub fn capture_log(&mut self, level: impl Into<String>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level: level.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    pub fn outcomes(&self) -> &[OutcomeRecord] {
        &self.outcomes
    }

    fn artifact(&mut self) -> TestArtifact {
        self.metadata.duration_ms = self.start_time.elapsed().as_millis() as u64;
        TestArtifact {
            metadata: self.metadata.clone(),
            calls: self.calls.clone(),
            outcomes: self.outcomes.clone(),
            authoring_errors: self.authoring_errors.clone(),
            logs: self.logs.clone(),
        }
    }

    /// Write the artifact as pretty JSON into `output_dir`, returning its path
    pub async fn save(&mut self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let artifact = self.artifact();

        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)
            .await
            .context("Failed to create artifact directory")?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filepath = output_dir.join(format!("{}_{}.json", self.metadata.test_name, timestamp));

        let json =
            serde_json::to_string_pretty(&artifact).context("Failed to serialize artifact")?;
        let mut file = fs::File::create(&filepath)
            .await
            .context("Failed to create artifact file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write artifact data")?;
        file.flush().await.context("Failed to flush artifact file")?;

        if log::log_enabled!(log::Level::Info) {
            log::info!("Saved failure artifact to {}", filepath.display());
        }
        Ok(filepath)
    }

    /// Save into `$STREAMKV_ARTIFACT_DIR`; does nothing when it is unset
    pub async fn save_to_env_dir(&mut self) -> Result<Option<PathBuf>> {
        match std::env::var_os(ARTIFACT_DIR_ENV) {
            Some(dir) => self.save(PathBuf::from(dir)).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn load(filepath: impl AsRef<Path>) -> Result<TestArtifact> {
        let filepath = filepath.as_ref();
        let content = fs::read_to_string(filepath)
            .await
            .with_context(|| format!("Failed to read artifact file {}", filepath.display()))?;
        serde_json::from_str(&content).context("Failed to parse artifact JSON")
    }
}

fn capture_call<R: Serialize>(
    method: Method,
    record: &RequestRecord<R>,
    origin: Instant,
) -> Result<RecordedCall> {
    let request = serde_json::to_value(&record.request)
        .with_context(|| format!("Failed to serialize {} request", method))?;
    Ok(RecordedCall {
        method,
        offset_ms: record.received_at.saturating_duration_since(origin).as_millis() as u64,
        request,
        metadata: record.metadata.clone(),
    })
}

fn authoring_errors(server: &ScriptedServer) -> Vec<String> {
    server
        .authoring_errors()
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{RowChunk, ScriptedAction, SequencePolicy};
    use std::time::Duration;
    use streamkv_common::proxy::RowsResult;
    use streamkv_common::{CallContext, DataService, ReadRowsRequest, Status};

    #[tokio::test(start_paused = true)]
    async fn test_capture_server_orders_calls_by_offset() {
        let server = ScriptedServer::builder()
            .read_rows(
                SequencePolicy::Linear,
                vec![ScriptedAction::chunks(vec![RowChunk::commit("a", "v")])],
            )
            .build();
        server
            .read_rows(CallContext::default(), ReadRowsRequest::new("t1"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(250)).await;
        server
            .read_rows(CallContext::default(), ReadRowsRequest::new("t2"))
            .await
            .unwrap();

        let mut collector = ArtifactCollector::new("capture");
        collector.capture_server(&server).unwrap();
        let offsets: Vec<u64> = collector.calls().iter().map(|c| c.offset_ms).collect();
        assert_eq!(offsets, vec![0, 250]);
        assert_eq!(collector.calls()[1].request["table_name"], "t2");
        assert_eq!(server.read_rows_recorder().len(), 2);
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let mut collector = ArtifactCollector::new("save_and_load");
        collector.capture_outcome(
            "read",
            &OperationResult::Read(RowsResult {
                status: Status::deadline_exceeded("timed out"),
                rows: Vec::new(),
            }),
        );
        collector.capture_log("WARN", "retrying");
        collector.set_failure_reason("expected OK");

        let path = collector.save(temp_dir.path()).await?;
        let artifact = ArtifactCollector::load(&path).await?;
        assert_eq!(artifact.metadata.test_name, "save_and_load");
        assert_eq!(artifact.outcomes[0].code, Code::DeadlineExceeded);
        assert_eq!(artifact.logs.len(), 1);
        assert_eq!(
            artifact.metadata.failure_reason.as_deref(),
            Some("expected OK")
        );
        Ok(())
    }
}
