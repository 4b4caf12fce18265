//! Clipflow Common Utilities
//!
//! Shared infrastructure for all Clipflow crates:
//! - Error types and result aliases
//! - Wall-clock throttling for progress and preview reporting
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
