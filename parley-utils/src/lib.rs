//! parley-utils: Common utilities shared across parley crates
//!
//! This crate provides:
//! - Unified error types ([`ParleyError`], [`Result`])
//! - Logging initialization ([`init_logging`], [`init_logging_with_filter`])

pub mod error;
pub mod logging;

// Re-export main types at crate root for convenience
pub use error::{ParleyError, Result};
pub use logging::{init_logging, init_logging_with_filter};
