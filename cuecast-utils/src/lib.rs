//! cuecast-utils: Common utilities shared across cuecast crates
//!
//! This crate provides:
//! - Unified error types ([`CuecastError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])

pub mod error;
pub mod logging;

// Re-export main types at crate root for convenience
pub use error::{CuecastError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig};
