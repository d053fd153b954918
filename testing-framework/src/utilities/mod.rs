// File: testing-framework/src/utilities/mod.rs
//
// Testing Utilities
//
// Failure artifacts for conformance runs.

/// Failure artifact collection for test debugging and reproduction
pub mod artifacts;

/// Artifact replay utilities for inspecting saved failures
pub mod replay;

pub use artifacts::{ArtifactCollector, TestArtifact, ARTIFACT_DIR_ENV};
pub use replay::{get_replay_command, load_artifact, print_artifact_summary, validate_artifact};
