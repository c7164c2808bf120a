//! Errors raised by the storage layer.
//!
//! Missing keys and members are not errors; they come back as `None`.
//! The only failures are the ones a caller must not be allowed to miss.

use thiserror::Error;

/// Errors that can occur while executing a store operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `INCR` hit a live value that does not parse as a signed integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// `INCR` would move the value past `i64::MAX`.
    #[error("increment would overflow")]
    Overflow,
}
