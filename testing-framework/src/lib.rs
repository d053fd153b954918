//! # StreamKV Conformance Harness
//!
//! Scripted, deterministic test harness for clients of a streaming
//! key-value data service.
//!
//! ## Architecture Overview
//!
//! - **emulator**: a scripted fake of the data service. Per method it holds
//!   an ordered list of emit/fail actions, hands them to inbound calls under a
//!   sequencing policy and records every call it receives.
//! - **driver**: submits logical operations to the client under test through
//!   a `ClientProxy` and returns handles that always resolve.
//! - **verify**: assertion helpers over results and recorded calls.
//! - **scenarios**: YAML scripts for the emulator.
//! - **utilities**: failure artifacts and their replay.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use streamkv_testing_framework::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_paused_scan() -> anyhow::Result<()> {
//!     let server = ScriptedServer::builder()
//!         .read_rows(
//!             SequencePolicy::Linear,
//!             vec![
//!                 ScriptedAction::chunks(vec![RowChunk::commit("row-01", "v1")]),
//!                 ScriptedAction::fail(Code::Aborted),
//!                 ScriptedAction::chunks(vec![RowChunk::commit("row-02", "v2")]),
//!             ],
//!         )
//!         .build();
//!     let driver = OperationDriver::new(Arc::new(LocalProxy::new(Arc::new(server.clone()))));
//!
//!     let result = driver
//!         .run_one(Submission::read("c1", ReadRowsRequest::new("t")), &OperationOptions::default())
//!         .await;
//!     check_ok(&result)?;
//!     assert_eq!(result.rows().len(), 2);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: every delay runs on the injected clock, suites run on
//!    tokio's paused time
//! 2. **Loud authoring errors**: a broken script is reported as such, never
//!    as a client failure
//! 3. **Always resolves**: each submitted operation ends in exactly one result

#![warn(clippy::all)]

/// Time control - provides Clock, SystemClock, PausedClock
pub mod orchestrator;

/// Scripted data service
pub mod emulator;

/// Operation submission and completion handles
pub mod driver;

/// Assertion helpers for suites
pub mod verify;

/// YAML script DSL
pub mod scenarios;

/// Failure artifacts
pub mod utilities;

pub mod error;

// Convenient re-exports for common usage
pub mod prelude;

pub use driver::{OperationDriver, OperationOptions, OperationResult, Submission};
pub use emulator::{ScriptedServer, ScriptedServerBuilder, SequencePolicy};
pub use error::{HarnessError, HarnessResult, Method};
pub use orchestrator::{Clock, PausedClock, SystemClock};

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
