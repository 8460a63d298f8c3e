//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding ANT frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// First byte is not a sync byte.
    #[error("bad sync byte 0x{0:02X}")]
    BadSync(u8),

    /// Length byte outside the legal range.
    #[error("bad length byte {0} (must be 1-32)")]
    BadLength(u8),

    /// Frame does not XOR to zero.
    #[error("checksum mismatch")]
    BadChecksum,

    /// Payload does not fit in a single frame.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length supplied.
        actual: usize,
    },
}
