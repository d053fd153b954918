//! Convenient re-exports for conformance suites
//!
//! ```rust,ignore
//! use streamkv_testing_framework::prelude::*;
//! ```

pub use crate::driver::{
    Operation, OperationDriver, OperationOptions, OperationResult, PendingOperation,
    ShutdownHandle, Submission,
};
pub use crate::emulator::{
    is_authoring_error, materialize, ChunkStatus, EmulatorConfig, EntryOutcomes, MutateRowsRecord, ReadRowsRecord,
    RowChunk, ScriptedAction, ScriptedServer, ScriptedServerBuilder, SequencePolicy,
};
pub use crate::error::{HarnessError, HarnessResult, Method};
pub use crate::orchestrator::{Clock, PausedClock, SystemClock};
pub use crate::scenarios::{parse_script, ScriptFile};
pub use crate::verify::*;

pub use streamkv_common::proxy::{ClientProxy, MutateRowsResult, RowsResult};
pub use streamkv_common::{
    Code, MutateRowsRequest, MutationEntry, ReadRowsRequest, Row, RowBound, RowRange, RowSet,
    Status,
};

pub use std::sync::Arc;
pub use tokio::time::Duration;
