//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.
//!
//! Ordinary misses are not errors: reads on absent or expired keys yield
//! `None`, deletes yield `false`/`0`. The error enum covers the remaining
//! programming-error-class faults, which today is invalid construction
//! configuration.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache library.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Construction options failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache library.
pub type Result<T> = std::result::Result<T, CacheError>;
