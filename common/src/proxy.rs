// Client-facing seam used by the operation driver. A proxy owns a set of
// clients under test, addressed by id, and reports the outcome of each
// operation as a status plus its payload.

use crate::data::{MutateRowsRequest, ReadRowsRequest, Row};
use crate::status::Status;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClientRequest {
    pub client_id: String,
    /// Address of the data service the client talks to
    pub data_target: String,
    #[serde(default)]
    pub app_profile_id: String,
    /// Per-operation deadline applied by the client
    #[serde(default, with = "crate::serializer::opt_duration_ms")]
    pub timeout: Option<Duration>,
}

/// Outcome of a read: the rows delivered before the final status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowsResult {
    pub status: Status,
    pub rows: Vec<Row>,
}

/// Outcome of one mutation entry; `index` refers to the original request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryResult {
    pub index: usize,
    pub status: Status,
}

/// Outcome of a bulk write. `entries` lists failed entries only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutateRowsResult {
    pub status: Status,
    pub entries: Vec<EntryResult>,
}

impl MutateRowsResult {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.index).collect()
    }
}

#[async_trait]
pub trait ClientProxy: Send + Sync {
    async fn create_client(&self, request: CreateClientRequest) -> Result<(), Status>;

    /// New operations on a closed client fail; in-flight ones run to completion
    async fn close_client(&self, client_id: &str) -> Result<(), Status>;

    async fn remove_client(&self, client_id: &str) -> Result<(), Status>;

    async fn read_rows(
        &self,
        client_id: &str,
        request: ReadRowsRequest,
    ) -> Result<RowsResult, Status>;

    async fn mutate_rows(
        &self,
        client_id: &str,
        request: MutateRowsRequest,
    ) -> Result<MutateRowsResult, Status>;
}
