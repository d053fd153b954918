#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//! Script DSL tests: the bundled scripts parse, run and behave as described,
//! and malformed scripts are rejected with a useful message.

mod common;

use common::{mutate_request, read_request, row_keys, Harness};
use std::io::Write;
use streamkv_common::metadata::DEFAULT_ROUTING_COOKIE_HEADER;
use streamkv_testing_framework::prelude::*;
use streamkv_testing_framework::scenarios::load_script;

const PAUSED_SCAN: &str = include_str!("../scenarios/paused_scan.yaml");
const STREAM_RESET: &str = include_str!("../scenarios/stream_reset.yaml");
const MULTI_CELL_ROWS: &str = include_str!("../scenarios/multi_cell_rows.yaml");
const ROUTING_COOKIE: &str = include_str!("../scenarios/routing_cookie.yaml");
const PARTIAL_WRITE: &str = include_str!("../scenarios/partial_write.yaml");

#[test]
fn test_parse_all_scripts() {
    let scripts = vec![
        PAUSED_SCAN,
        STREAM_RESET,
        MULTI_CELL_ROWS,
        ROUTING_COOKIE,
        PARTIAL_WRITE,
    ];

    for (i, yaml) in scripts.iter().enumerate() {
        let script = parse_script(yaml)
            .unwrap_or_else(|e| panic!("Failed to parse script {}: {}", i, e));
        assert!(!script.name.is_empty());
        assert!(
            !script.read_rows.actions.is_empty() || !script.mutate_rows.actions.is_empty(),
            "script '{}' scripts nothing",
            script.name
        );
    }
}

#[test]
fn test_parse_script_sections() {
    let script = parse_script(STREAM_RESET).expect("Failed to parse");
    assert_eq!(script.name, "stream reset");
    assert_eq!(script.read_rows.policy, SequencePolicy::Linear);
    assert_eq!(script.read_rows.actions.len(), 4);
    assert_eq!(
        script.read_rows.actions[1].delay(),
        Some(Duration::from_secs(10))
    );
    assert!(script.mutate_rows.actions.is_empty());

    let emulator = script.emulator.expect("emulator section");
    assert_eq!(emulator.max_call_age, Some(Duration::from_secs(4)));
    assert_eq!(emulator.max_call_age_grace, Duration::from_secs(1));
    assert_eq!(emulator.recorder_capacity, 16);
}

#[test]
fn test_parse_write_outcomes() {
    let script = parse_script(PARTIAL_WRITE).expect("Failed to parse");
    let expected = ScriptedAction::entries(
        EntryOutcomes::new()
            .succeeded([0, 3])
            .failed(Code::PermissionDenied, [1, 2]),
    )
    .end_of_stream();
    assert_eq!(script.mutate_rows.policy, SequencePolicy::RoundRobinDistinct);
    assert_eq!(script.mutate_rows.actions, vec![expected]);
}

#[test]
fn test_reject_malformed_scripts() {
    let cases = [
        ("name: \"\"\n", "name"),
        (
            "name: x\nread_rows:\n  actions:\n    - {}\n",
            "read_rows action #0",
        ),
        (
            "name: x\nread_rows:\n  actions:\n    - emit: { succeeded: [0] }\n",
            "entry outcomes",
        ),
        (
            "name: x\nmutate_rows:\n  actions:\n    - emit: { chunks: [] }\n",
            "mutate_rows action #0",
        ),
        (
            "name: x\nmutate_rows:\n  actions:\n    - emit: { failed: { ok: [0] } }\n",
            "code ok",
        ),
        (
            "name: x\nread_rows:\n  actions:\n    - emit: { chunks: [] }\n      fail: { code: internal }\n",
            "not both",
        ),
        ("name: x\nsteps: []\n", "unknown field"),
    ];

    for (yaml, fragment) in cases {
        let err = parse_script(yaml).expect_err(yaml);
        assert!(matches!(err, HarnessError::Script(_)), "{:?}", err);
        assert!(
            err.to_string().contains(fragment),
            "error for {:?} should mention '{}': {}",
            yaml,
            fragment,
            err
        );
    }
}

#[test]
fn test_load_script_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PAUSED_SCAN.as_bytes()).unwrap();

    let script = tokio_test::block_on(load_script(file.path())).unwrap();
    assert_eq!(script, parse_script(PAUSED_SCAN).unwrap());

    let missing = tokio_test::block_on(load_script("/nonexistent/script.yaml"));
    let err = missing.expect_err("missing file must fail");
    assert!(err.to_string().contains("Failed to read script"));
}

#[tokio::test(start_paused = true)]
async fn test_paused_scan_script_resumes() {
    let harness = Harness::new(parse_script(PAUSED_SCAN).unwrap().build_server());

    let result = harness.read(read_request(), &OperationOptions::default()).await;
    check_ok(&result).unwrap();
    assert_eq!(row_keys(&result), vec!["row-01", "row-05"]);

    let records = harness.server.read_rows_recorder().snapshot();
    assert_eq!(resume_start(&records[1]), Some(RowBound::open("row-01")));
}

#[tokio::test(start_paused = true)]
async fn test_stream_reset_script_resumes() {
    let harness = Harness::new(parse_script(STREAM_RESET).unwrap().build_server());

    let result = harness.read(read_request(), &OperationOptions::default()).await;
    check_ok(&result).unwrap();
    assert_eq!(row_keys(&result), vec!["abar", "qbar", "zbar"]);
    assert_eq!(harness.server.read_rows_recorder().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_multi_cell_script_matches_materialized_rows() {
    let script = parse_script(MULTI_CELL_ROWS).unwrap();
    let chunks = match &script.read_rows.actions[0] {
        ScriptedAction::Emit(emit) => match &emit.payload {
            streamkv_testing_framework::emulator::EmitPayload::Chunks(chunks) => chunks.clone(),
            other => panic!("unexpected payload {:?}", other),
        },
        other => panic!("unexpected action {:?}", other),
    };
    let harness = Harness::new(script.build_server());

    let result = harness.read(read_request(), &OperationOptions::default()).await;
    check_ok(&result).unwrap();
    assert_eq!(result.rows(), materialize(&chunks).as_slice());
    assert_eq!(row_keys(&result), vec!["row-01", "row-03"]);
    assert_eq!(result.rows()[0].cell_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_routing_cookie_script_for_both_methods() {
    let harness = Harness::new(parse_script(ROUTING_COOKIE).unwrap().build_server());
    let options = OperationOptions::default();

    let read = harness.read(read_request(), &options).await;
    check_ok(&read).unwrap();
    let reads = harness.server.read_rows_recorder().snapshot();
    assert_eq!(reads.len(), 4);
    assert_eq!(
        routing_cookie_in(&reads[3], DEFAULT_ROUTING_COOKIE_HEADER).as_deref(),
        Some("new-test-cookie")
    );
    check_inter_arrival_at_least(&reads[2..], Duration::from_secs(2)).unwrap();

    let write = harness.mutate(mutate_request(1), &options).await;
    check_ok(&write).unwrap();
    let writes = harness.server.mutate_rows_recorder().snapshot();
    assert_eq!(writes.len(), 2);
    assert_eq!(
        routing_cookie_in(&writes[1], DEFAULT_ROUTING_COOKIE_HEADER).as_deref(),
        Some("test-cookie")
    );
}
