// File: testing-framework/src/orchestrator/mod.rs
//
// Orchestrator Module
//
// Time control shared by the scripted server, the operation driver and the
// suites. Everything time-dependent in the harness goes through `Clock`.

/// Clock abstractions for deterministic time control in tests
pub mod clock;

pub use clock::{Clock, PausedClock, SystemClock};

use std::sync::Arc;

/// Clock used when a builder is not handed one explicitly
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
