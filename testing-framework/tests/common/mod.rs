// Common harness setup for the conformance suites
//
// A suite scripts a `ScriptedServer`, wraps it in the reference client's
// `LocalProxy` and drives operations through an `OperationDriver`.

#![allow(dead_code)]

use std::sync::Arc;
use streamkv_client::{ClientConfig, LocalProxy};
use streamkv_common::{build_table_name, MutateRowsRequest, MutationEntry, ReadRowsRequest};
use streamkv_testing_framework::driver::{
    OperationDriver, OperationOptions, OperationResult, Submission,
};
use streamkv_testing_framework::emulator::ScriptedServer;

pub const TABLE_ID: &str = "table";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn table_name() -> String {
    build_table_name(TABLE_ID)
}

pub fn read_request() -> ReadRowsRequest {
    ReadRowsRequest::new(table_name())
}

/// Write of one SetCell per key, `f:col` at timestamp 1000
pub fn mutate_request_for(keys: &[&str]) -> MutateRowsRequest {
    MutateRowsRequest::new(
        table_name(),
        keys.iter()
            .map(|key| MutationEntry::set_cell(*key, "value"))
            .collect(),
    )
}

/// Write of rows `row-0` .. `row-{n-1}`
pub fn mutate_request(rows: usize) -> MutateRowsRequest {
    let keys: Vec<String> = (0..rows).map(|i| format!("row-{}", i)).collect();
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    mutate_request_for(&refs)
}

pub fn row_keys(result: &OperationResult) -> Vec<String> {
    result.rows().iter().map(|row| row.key_str()).collect()
}

/// Scripted server plus the client stack under test. Dropping it fails the
/// test if the script was misused during the run.
pub struct Harness {
    pub server: ScriptedServer,
    pub proxy: Arc<LocalProxy>,
    pub driver: OperationDriver,
}

impl Harness {
    pub fn new(server: ScriptedServer) -> Self {
        Self::with_client_config(server, ClientConfig::default())
    }

    pub fn with_client_config(server: ScriptedServer, config: ClientConfig) -> Self {
        init_logging();
        let proxy = Arc::new(LocalProxy::with_defaults(Arc::new(server.clone()), config));
        let driver = OperationDriver::with_clock(proxy.clone(), server.clock());
        Self {
            server,
            proxy,
            driver,
        }
    }

    /// Run one read on a fresh client and tear it down
    pub async fn read(
        &self,
        request: ReadRowsRequest,
        options: &OperationOptions,
    ) -> OperationResult {
        self.driver
            .run_one(Submission::read("test-client", request), options)
            .await
    }

    /// Run one write on a fresh client and tear it down
    pub async fn mutate(
        &self,
        request: MutateRowsRequest,
        options: &OperationOptions,
    ) -> OperationResult {
        self.driver
            .run_one(Submission::mutate("test-client", request), options)
            .await
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.server.assert_script_sound();
        }
    }
}
