//! YAML script DSL
//!
//! Scripts describe the actions the scripted server plays, one section per
//! method, so a conformance scenario can live next to its suite as data.
//!
//! ## Example Script
//!
//! ```yaml
//! name: "paused scan"
//! description: "first attempt dies after one row, retry resumes"
//! read_rows:
//!   policy: linear
//!   actions:
//!     - emit:
//!         chunks:
//!           - { key: "row-01", value: "v1", status: commit }
//!     - fail: { code: aborted, routing_cookie: "c1", retry_delay_ms: 2000 }
//!     - emit:
//!         delay_ms: 100
//!         chunks:
//!           - { key: "row-02", value: "v2", status: commit }
//! mutate_rows:
//!   policy: round_robin_distinct
//!   actions:
//!     - emit: { succeeded: [0, 3], failed: { permission_denied: [1, 2] }, end_of_stream: true }
//! ```
//!
//! Fields:
//! - chunk `status` is `continue` (default), `commit` or `drop`
//! - `family`/`qualifier` default to `f`/`col`
//! - delays are milliseconds
//! - an optional `emulator` section takes the fields of `EmulatorConfig`

pub mod parser;

pub use parser::{load_script, parse_script, ScriptFile, ScriptSection};
