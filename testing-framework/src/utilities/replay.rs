// File: testing-framework/src/utilities/replay.rs
//
// Artifact Replay Utilities
//
// Loading, validating and printing saved failure artifacts.

use super::artifacts::{ArtifactCollector, TestArtifact};
use anyhow::Result;
use std::path::Path;

const BOX_WIDTH: usize = 62;

pub async fn load_artifact(filepath: impl AsRef<Path>) -> Result<TestArtifact> {
    ArtifactCollector::load(filepath).await
}

fn boxed(label: &str, value: impl std::fmt::Display) {
    println!("║ {:14}{:48} ║", label, value.to_string());
}

fn rule() {
    println!("╠{}╣", "═".repeat(BOX_WIDTH + 2));
}

/// Print a human-readable summary of `artifact` to stdout
pub fn print_artifact_summary(artifact: &TestArtifact) {
    println!("╔{}╗", "═".repeat(BOX_WIDTH + 2));
    println!("║ {:^62} ║", "CONFORMANCE FAILURE ARTIFACT");
    rule();
    boxed("Test Name:", &artifact.metadata.test_name);
    boxed(
        "Script:",
        artifact.metadata.script_name.as_deref().unwrap_or("N/A"),
    );
    boxed("Timestamp:", &artifact.metadata.timestamp);
    boxed(
        "Duration:",
        format!("{} ms", artifact.metadata.duration_ms),
    );

    if let Some(ref reason) = artifact.metadata.failure_reason {
        rule();
        println!("║ {:62} ║", "FAILURE REASON:");
        for line in textwrap::wrap(reason, BOX_WIDTH) {
            println!("║ {:62} ║", line);
        }
    }

    rule();
    boxed("Calls:", format!("{} recorded", artifact.calls.len()));
    boxed("Outcomes:", format!("{} captured", artifact.outcomes.len()));
    boxed("Log Entries:", format!("{} captured", artifact.logs.len()));

    if !artifact.calls.is_empty() {
        rule();
        println!("║ {:62} ║", "CALLS:");
        for call in &artifact.calls {
            let line = format!("+{:>6} ms  {}", call.offset_ms, call.method);
            println!("║   {:60} ║", line);
        }
    }

    if !artifact.outcomes.is_empty() {
        rule();
        println!("║ {:62} ║", "OUTCOMES:");
        for outcome in &artifact.outcomes {
            let line = format!(
                "{}: {} rows={} failed={:?}",
                outcome.label, outcome.code, outcome.rows, outcome.failed_entries
            );
            for wrapped in textwrap::wrap(&line, BOX_WIDTH - 2) {
                println!("║   {:60} ║", wrapped);
            }
        }
    }

    if !artifact.authoring_errors.is_empty() {
        rule();
        println!("║ {:62} ║", "SCRIPT ERRORS:");
        for error in &artifact.authoring_errors {
            for wrapped in textwrap::wrap(error, BOX_WIDTH - 2) {
                println!("║   {:60} ║", wrapped);
            }
        }
    }

    rule();
    println!("║ {:62} ║", "REPLAY COMMAND:");
    for wrapped in textwrap::wrap(&get_replay_command(artifact), BOX_WIDTH) {
        println!("║ {:62} ║", wrapped);
    }
    println!("╚{}╝", "═".repeat(BOX_WIDTH + 2));
}

/// Shell command that reruns the failed test
pub fn get_replay_command(artifact: &TestArtifact) -> String {
    format!(
        "RUST_LOG=debug cargo test {} -- --nocapture",
        artifact.metadata.test_name
    )
}

/// Check that an artifact is internally consistent
pub fn validate_artifact(artifact: &TestArtifact) -> Result<()> {
    if artifact.metadata.test_name.is_empty() {
        anyhow::bail!("Artifact has empty test name");
    }
    if artifact.metadata.timestamp.is_empty() {
        anyhow::bail!("Artifact has empty timestamp");
    }

    if let Some(call) = artifact.calls.first() {
        if call.offset_ms != 0 {
            anyhow::bail!(
                "First call is at +{} ms, offsets must start at zero",
                call.offset_ms
            );
        }
    }
    for (i, pair) in artifact.calls.windows(2).enumerate() {
        if pair[1].offset_ms < pair[0].offset_ms {
            anyhow::bail!("Call #{} is recorded before call #{}", i + 1, i);
        }
    }

    for outcome in &artifact.outcomes {
        if outcome.rows > 0 && !outcome.failed_entries.is_empty() {
            anyhow::bail!(
                "Outcome '{}' mixes read rows with failed write entries",
                outcome.label
            );
        }
    }
    Ok(())
}
