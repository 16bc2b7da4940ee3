//! Common error types for GateCheck.

use thiserror::Error;

/// Top-level error type for GateCheck operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Attendee id absent from the local cache (bad or foreign QR code).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attendee already has an active check-in on this device.
    #[error("Already checked in: {0}")]
    Duplicate(String),

    /// Network or server temporarily unavailable; safe to retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Server-confirmed disagreement; terminal, requires human resolution.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input, e.g. an empty override reason.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure is safe to retry on a later sync cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Io(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
