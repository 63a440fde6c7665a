//! # Followgraph Observe
//!
//! Structured logging setup and span helpers shared by the
//! followgraph crates.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
