//! citegate-common — Shared types, errors, and traits used across all citegate crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CitegateError, Result};
pub use types::{ExtractMode, FetchStatus, FetchedSource, ResourceMeta, SourcePageRecord};
