// Example: Script Runner
//
// Loads a YAML script, plays it against the reference client on paused time
// and writes a failure artifact describing every call the emulator saw.
//
//   cargo run --example script_runner -- testing-framework/scenarios/stream_reset.yaml

use anyhow::Result;
use std::sync::Arc;
use streamkv_client::LocalProxy;
use streamkv_common::{build_table_name, MutateRowsRequest, MutationEntry, ReadRowsRequest};
use streamkv_testing_framework::driver::{OperationDriver, OperationOptions, Submission};
use streamkv_testing_framework::scenarios::load_script;
use streamkv_testing_framework::utilities::{
    get_replay_command, load_artifact, print_artifact_summary, validate_artifact,
    ArtifactCollector,
};

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> Result<()> {
    env_logger::init();

    let default_script = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/paused_scan.yaml");
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_script.to_string());
    println!("1. Loading script {}", path);
    let script = load_script(&path).await?;
    let server = script.build_server();

    let proxy = Arc::new(LocalProxy::new(Arc::new(server.clone())));
    let driver = OperationDriver::with_clock(proxy, server.clock());
    let options = OperationOptions::default();
    let table = build_table_name("table");

    let mut collector = ArtifactCollector::new("script_runner");
    collector.set_script_name(script.name.clone());

    if !script.read_rows.actions.is_empty() {
        println!("2. Reading {}", table);
        let result = driver
            .run_one(Submission::read("runner", ReadRowsRequest::new(&table)), &options)
            .await;
        println!("   {} rows, status {}", result.rows().len(), result.status());
        collector.capture_outcome("read", &result);
    }

    if !script.mutate_rows.actions.is_empty() {
        println!("3. Writing 4 rows to {}", table);
        let entries = (0..4)
            .map(|i| MutationEntry::set_cell(format!("row-{}", i), "value"))
            .collect();
        let result = driver
            .run_one(
                Submission::mutate("runner", MutateRowsRequest::new(&table, entries)),
                &options,
            )
            .await;
        println!(
            "   failed entries {:?}, status {}",
            result.failed_indices(),
            result.status()
        );
        collector.capture_outcome("write", &result);
    }

    server.wait_idle().await;
    collector.capture_server(&server)?;
    if !server.authoring_errors().is_empty() {
        collector.set_failure_reason("script drew unexpected calls");
    }

    let dir = std::env::temp_dir().join("streamkv-artifacts");
    let saved = collector.save(&dir).await?;
    println!("4. Artifact written to {}\n", saved.display());

    let artifact = load_artifact(&saved).await?;
    validate_artifact(&artifact)?;
    print_artifact_summary(&artifact);
    println!("\nReplay with: {}", get_replay_command(&artifact));
    Ok(())
}
