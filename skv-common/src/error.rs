//! # Error Types
//!
//! Error taxonomy for the cache. Map operations are total and never
//! fail; only snapshot I/O and option parsing produce errors, so the
//! enums here stay small.

use thiserror::Error;

/// Errors produced by a snapshot codec implementation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying reader or writer failed.
    #[error("snapshot i/o failed")]
    Io(#[from] std::io::Error),

    /// The codec could not serialize the entry map.
    #[error("snapshot encode failed: {0}")]
    Encode(String),

    /// The codec could not deserialize the entry map.
    #[error("snapshot decode failed: {0}")]
    Decode(String),
}

/// Errors surfaced by the cache snapshot operations.
///
/// A decode error may leave the cache partially populated: decoded
/// entries are inserted one by one and become visible as they arrive.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The configured codec failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The operation observed its cancellation handle before
    /// completing. Entries transferred so far remain in place.
    #[error("snapshot cancelled before completion")]
    Cancelled,
}

/// Errors raised while applying construction options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// A string-typed duration option did not parse.
    #[error("invalid duration string {input:?}: {reason}")]
    InvalidDuration {
        /// The rejected input.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },
}
