//! Error types for the reactive core.
//!
//! Almost nothing in the engine can fail: tracking and triggering unknown
//! locations are no-ops, stopping a computation twice is a no-op, and writes
//! through read-only wrappers are logged and discarded. The error type only
//! surfaces where a caller explicitly asks to hear about a failure.

use thiserror::Error;

/// Errors reported by the fallible variants of the reactive API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write was attempted through a read-only or shallow read-only wrapper.
    #[error("set operation on key \"{key}\" failed: target is readonly")]
    ReadonlyViolation { key: String },

    /// A [`Value`](crate::reactive::Value) did not hold the requested type.
    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
