// File: testing-framework/src/driver/mod.rs
//
// Operation Driver
//
// Submits logical operations to the system under test through a
// `ClientProxy` and hands back handles that always resolve, either with the
// client's own result or with a driver-side `DeadlineExceeded`/`Cancelled`.

pub mod handle;

pub use handle::{PendingOperation, ShutdownHandle};

use crate::error::{HarnessError, HarnessResult};
use crate::orchestrator::{default_clock, Clock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use streamkv_common::proxy::{ClientProxy, CreateClientRequest, MutateRowsResult, RowsResult};
use streamkv_common::{Code, MutateRowsRequest, ReadRowsRequest, Row, Status};
use tokio::sync::Mutex;

/// Target address handed to clients opened by the driver
pub const DEFAULT_DATA_TARGET: &str = "scripted-server";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ReadRows(ReadRowsRequest),
    MutateRows(MutateRowsRequest),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ReadRows(_) => OperationKind::Read,
            Self::MutateRows(_) => OperationKind::Write,
        }
    }

    /// Same operation addressed to `app_profile_id`
    pub fn with_app_profile(self, app_profile_id: &str) -> Self {
        match self {
            Self::ReadRows(mut request) => {
                request.app_profile_id = app_profile_id.to_string();
                Self::ReadRows(request)
            }
            Self::MutateRows(mut request) => {
                request.app_profile_id = app_profile_id.to_string();
                Self::MutateRows(request)
            }
        }
    }
}

/// One logical operation addressed to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub client_id: String,
    pub operation: Operation,
}

impl Submission {
    pub fn read(client_id: impl Into<String>, request: ReadRowsRequest) -> Self {
        Self {
            client_id: client_id.into(),
            operation: Operation::ReadRows(request),
        }
    }

    pub fn mutate(client_id: impl Into<String>, request: MutateRowsRequest) -> Self {
        Self {
            client_id: client_id.into(),
            operation: Operation::MutateRows(request),
        }
    }
}

/// Options applied when a client is first opened. `timeout` is also
/// enforced by the driver and `app_profile_id` stamped on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationOptions {
    pub app_profile_id: Option<String>,
    #[serde(with = "streamkv_common::serializer::opt_duration_ms")]
    pub timeout: Option<Duration>,
}

impl OperationOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_app_profile(mut self, app_profile_id: impl Into<String>) -> Self {
        self.app_profile_id = Some(app_profile_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    /// Result carrying `status` and no payload
    pub fn failed(self, status: Status) -> OperationResult {
        match self {
            Self::Read => OperationResult::Read(RowsResult {
                status,
                rows: Vec::new(),
            }),
            Self::Write => OperationResult::Write(MutateRowsResult {
                status,
                entries: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Read(RowsResult),
    Write(MutateRowsResult),
}

impl OperationResult {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read(_) => OperationKind::Read,
            Self::Write(_) => OperationKind::Write,
        }
    }

    pub fn status(&self) -> &Status {
        match self {
            Self::Read(result) => &result.status,
            Self::Write(result) => &result.status,
        }
    }

    pub fn code(&self) -> Code {
        self.status().code
    }

    /// Rows of a read, empty for writes
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Read(result) => &result.rows,
            Self::Write(_) => &[],
        }
    }

    /// Original indices of failed write entries, empty for reads
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            Self::Read(_) => Vec::new(),
            Self::Write(result) => result.failed_indices(),
        }
    }

    pub fn as_read(&self) -> Option<&RowsResult> {
        match self {
            Self::Read(result) => Some(result),
            Self::Write(_) => None,
        }
    }

    pub fn as_write(&self) -> Option<&MutateRowsResult> {
        match self {
            Self::Write(result) => Some(result),
            Self::Read(_) => None,
        }
    }
}

/// Submits operations to clients behind a proxy
///
/// # Examples
///
/// ```rust,ignore
/// let driver = OperationDriver::new(Arc::new(LocalProxy::new(Arc::new(server))));
/// let pending = driver
///     .submit(Submission::read("c1", ReadRowsRequest::new("table")), &OperationOptions::default())
///     .await;
/// assert!(pending.wait().await.status().is_ok());
/// ```
pub struct OperationDriver {
    proxy: Arc<dyn ClientProxy>,
    clock: Arc<dyn Clock>,
    data_target: String,
    opened: Mutex<HashSet<String>>,
}

impl OperationDriver {
    pub fn new(proxy: Arc<dyn ClientProxy>) -> Self {
        Self::with_clock(proxy, default_clock())
    }

    pub fn with_clock(proxy: Arc<dyn ClientProxy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            proxy,
            clock,
            data_target: DEFAULT_DATA_TARGET.to_string(),
            opened: Mutex::new(HashSet::new()),
        }
    }

    pub fn proxy(&self) -> Arc<dyn ClientProxy> {
        Arc::clone(&self.proxy)
    }

    /// Open `client_id` on the proxy unless this driver already did
    pub async fn open_client(
        &self,
        client_id: &str,
        options: &OperationOptions,
    ) -> Result<(), Status> {
        let mut opened = self.opened.lock().await;
        if opened.contains(client_id) {
            return Ok(());
        }
        let request = CreateClientRequest {
            client_id: client_id.to_string(),
            data_target: self.data_target.clone(),
            app_profile_id: options.app_profile_id.clone().unwrap_or_default(),
            timeout: options.timeout,
        };
        match self.proxy.create_client(request).await {
            Ok(()) => {}
            Err(status) if status.code == Code::AlreadyExists => {
                log::debug!("client {} already open on the proxy", client_id);
            }
            Err(status) => return Err(status),
        }
        opened.insert(client_id.to_string());
        Ok(())
    }

    /// Tear down a client opened by this driver
    pub async fn remove_client(&self, client_id: &str) -> HarnessResult<()> {
        self.opened.lock().await.remove(client_id);
        match self.proxy.remove_client(client_id).await {
            Ok(()) => Ok(()),
            Err(status) if status.code == Code::NotFound => {
                Err(HarnessError::UnknownClient(client_id.to_string()))
            }
            Err(status) => Err(HarnessError::Script(format!(
                "removing client {} failed: {}",
                client_id, status
            ))),
        }
    }

    /// Start one operation. The deadline, if any, runs from this call.
    pub async fn submit(
        &self,
        submission: Submission,
        options: &OperationOptions,
    ) -> PendingOperation {
        let submitted_at = self.clock.now();
        let deadline = options.timeout.map(|t| submitted_at + t);
        let Submission {
            client_id,
            operation,
        } = submission;
        let kind = operation.kind();
        let operation = match &options.app_profile_id {
            Some(profile) => operation.with_app_profile(profile),
            None => operation,
        };

        let opened = self.open_client(&client_id, options).await;
        let proxy = Arc::clone(&self.proxy);
        let task_client = client_id.clone();
        let task = tokio::spawn(async move {
            if let Err(status) = opened {
                return kind.failed(refused(&task_client, status));
            }
            execute(proxy.as_ref(), &task_client, operation).await
        });
        PendingOperation::new(client_id, kind, submitted_at, deadline, task)
    }

    /// Start several operations concurrently, handles in submission order
    pub async fn submit_many(
        &self,
        submissions: Vec<Submission>,
        options: &OperationOptions,
    ) -> Vec<PendingOperation> {
        let mut pending = Vec::with_capacity(submissions.len());
        for submission in submissions {
            pending.push(self.submit(submission, options).await);
        }
        pending
    }

    /// Close `client_id` after `after`, or right away
    pub fn shutdown(&self, client_id: &str, after: Option<Duration>) -> ShutdownHandle {
        let proxy = Arc::clone(&self.proxy);
        let clock = Arc::clone(&self.clock);
        let id = client_id.to_string();
        let task = tokio::spawn(async move {
            if let Some(after) = after {
                clock.sleep(after).await;
            }
            log::debug!("closing client {}", id);
            proxy.close_client(&id).await
        });
        ShutdownHandle::new(client_id.to_string(), task)
    }

    /// Open, run and tear down a single operation
    pub async fn run_one(
        &self,
        submission: Submission,
        options: &OperationOptions,
    ) -> OperationResult {
        let client_id = submission.client_id.clone();
        let result = self.submit(submission, options).await.wait().await;
        if let Err(e) = self.remove_client(&client_id).await {
            log::warn!("Failed to tear down client {}: {}", client_id, e);
        }
        result
    }

    /// Run operations concurrently, optionally closing every client involved
    /// after `close_after`; results in submission order
    pub async fn run_batch(
        &self,
        submissions: Vec<Submission>,
        options: &OperationOptions,
        close_after: Option<Duration>,
    ) -> Vec<OperationResult> {
        let clients: BTreeSet<String> = submissions.iter().map(|s| s.client_id.clone()).collect();
        let pending = self.submit_many(submissions, options).await;

        let shutdowns: Vec<ShutdownHandle> = match close_after {
            Some(after) => clients
                .iter()
                .map(|id| self.shutdown(id, Some(after)))
                .collect(),
            None => Vec::new(),
        };

        let results =
            futures::future::join_all(pending.into_iter().map(PendingOperation::wait)).await;
        for shutdown in shutdowns {
            let client_id = shutdown.client_id().to_string();
            if let Err(status) = shutdown.wait().await {
                log::warn!("Closing client {} failed: {}", client_id, status);
            }
        }
        results
    }
}

impl std::fmt::Debug for OperationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDriver")
            .field("data_target", &self.data_target)
            .finish()
    }
}

fn refused(client_id: &str, status: Status) -> Status {
    Status::unavailable(format!(
        "proxy refused operation on client {}: {}",
        client_id, status
    ))
}

async fn execute(proxy: &dyn ClientProxy, client_id: &str, operation: Operation) -> OperationResult {
    let kind = operation.kind();
    let outcome = match operation {
        Operation::ReadRows(request) => proxy
            .read_rows(client_id, request)
            .await
            .map(OperationResult::Read),
        Operation::MutateRows(request) => proxy
            .mutate_rows(client_id, request)
            .await
            .map(OperationResult::Write),
    };
    outcome.unwrap_or_else(|status| kind.failed(refused(client_id, status)))
}
