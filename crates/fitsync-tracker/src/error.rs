//! Error types for the tracker session.

use fitsync_link::LinkError;
use thiserror::Error;

/// Errors that can occur while talking to the tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The ANT link failed.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// No usable reply to an opcode within the attempt budget.
    #[error("failed to run opcode after {attempts} attempts")]
    OpcodeFailed {
        /// Attempts made.
        attempts: usize,
    },

    /// The tracker never sent an empty data bank page.
    #[error("cannot complete data bank after {requests} page requests")]
    DataBankIncomplete {
        /// Page requests made.
        requests: usize,
    },

    /// A payload does not fit the one-byte length of the upload header.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Largest supported payload.
        max: usize,
    },
}

/// Result type alias for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
