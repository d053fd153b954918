//! Reference data client for the StreamKV protocol.
//!
//! Reads merge chunked rows, validate key order and resume past the last
//! seen key after transient failures. Writes retry only the entries that
//! failed transiently. Both honour server routing cookies, retry hints and
//! an overall per-operation deadline.

#![allow(clippy::result_large_err)]

pub mod client;
pub mod config;
pub mod merger;
mod mutate_rows;
pub mod proxy;
mod read_rows;
pub mod resume;
pub mod retry;

pub use client::DataClient;
pub use config::{ClientConfig, RetrySettings};
pub use proxy::LocalProxy;
