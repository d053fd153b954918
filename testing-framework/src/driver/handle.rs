// File: testing-framework/src/driver/handle.rs
//
// Completion handles returned by the operation driver.

use crate::driver::{OperationKind, OperationResult};
use streamkv_common::Status;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};

/// An operation in flight. Resolves exactly once through [`wait`](Self::wait).
#[derive(Debug)]
pub struct PendingOperation {
    client_id: String,
    kind: OperationKind,
    submitted_at: Instant,
    deadline: Option<Instant>,
    task: JoinHandle<OperationResult>,
}

impl PendingOperation {
    pub(crate) fn new(
        client_id: String,
        kind: OperationKind,
        submitted_at: Instant,
        deadline: Option<Instant>,
        task: JoinHandle<OperationResult>,
    ) -> Self {
        Self {
            client_id,
            kind,
            submitted_at,
            deadline,
            task,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the operation; a later `wait` yields `Cancelled` unless it had
    /// already completed
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Result of the operation, or `DeadlineExceeded` once the timeout has
    /// elapsed since submission. On timeout the call keeps running detached
    /// and its eventual result is discarded.
    pub async fn wait(mut self) -> OperationResult {
        let joined = match self.deadline {
            Some(deadline) => match time::timeout_at(deadline, &mut self.task).await {
                Ok(joined) => joined,
                Err(_) => {
                    if log::log_enabled!(log::Level::Debug) {
                        log::debug!(
                            "{} on client {} timed out after {:?}",
                            self.kind,
                            self.client_id,
                            deadline - self.submitted_at
                        );
                    }
                    return self
                        .kind
                        .failed(Status::deadline_exceeded("operation timed out"));
                }
            },
            None => (&mut self.task).await,
        };
        joined.unwrap_or_else(|e| self.kind.failed(join_status(e)))
    }
}

fn join_status(error: JoinError) -> Status {
    if error.is_cancelled() {
        Status::cancelled("operation cancelled")
    } else {
        log::error!("Operation task panicked: {}", error);
        Status::internal(format!("operation task failed: {}", error))
    }
}

/// A scheduled client close
#[derive(Debug)]
pub struct ShutdownHandle {
    client_id: String,
    task: JoinHandle<Result<(), Status>>,
}

impl ShutdownHandle {
    pub(crate) fn new(client_id: String, task: JoinHandle<Result<(), Status>>) -> Self {
        Self { client_id, task }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait until the client has been closed
    pub async fn wait(self) -> Result<(), Status> {
        self.task.await.unwrap_or_else(|e| Err(join_status(e)))
    }
}
