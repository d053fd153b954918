// File: testing-framework/src/error.rs
//
// Harness-authoring errors. These describe a broken test script or harness
// setup, never a behaviour of the system under test, and are kept apart from
// the protocol `Status` values that operations resolve to.

use thiserror::Error;

/// Call surface a script or record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Method {
    ReadRows,
    MutateRows,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    #[error("{method} recorder is full ({capacity} records), the script drew more calls than expected")]
    RecorderOverflow { method: Method, capacity: usize },

    #[error("{method} call arrived after all {len} actions of the {policy} sequence were handed out")]
    SequenceExhausted {
        method: Method,
        policy: String,
        len: usize,
    },

    #[error("{method} action #{index} carries a payload for the other method")]
    ScriptMismatch { method: Method, index: usize },

    #[error("Unknown client '{0}'")]
    UnknownClient(String),

    #[error("Invalid script: {0}")]
    Script(String),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
