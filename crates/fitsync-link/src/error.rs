//! Error types for the link session.

use ant_protocol::{EventCode, Message, ProtocolError};
use thiserror::Error;

use crate::retry::Exhausted;

/// Errors that can occur while driving an ANT channel.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport failed a write (or a read outside the resync loop).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport kept returning nothing.
    #[error("read ant data failed after {attempts} attempts")]
    ReadFailed {
        /// Consecutive failed reads.
        attempts: usize,
    },

    /// A channel command was answered with something other than "no error".
    #[error("channel response to message 0x{message_id:02X}: {code}")]
    ChannelResponse {
        /// Message id the dongle responded to.
        message_id: u8,
        /// Event code it reported.
        code: EventCode,
    },

    /// A message arrived where a specific reply was required.
    #[error("unexpected message while waiting for {waiting_for}: {message:?}")]
    UnexpectedMessage {
        /// What was expected.
        waiting_for: &'static str,
        /// What arrived instead.
        message: Message,
    },

    /// The dongle reported the transfer as failed.
    #[error("transmission failed")]
    TransmitFailed,

    /// No transfer-completed event within the status poll budget.
    #[error("no acknowledgement seen after {polls} status polls")]
    NoAcknowledgement {
        /// Polls performed.
        polls: usize,
    },

    /// The dongle reported a burst receive failure.
    #[error("burst receive failed by event")]
    BurstFailed,

    /// No final burst packet within the poll budget.
    #[error("burst receive failed to detect end after {polls} polls")]
    BurstEndNotDetected {
        /// Polls performed.
        polls: usize,
    },

    /// A bounded retry loop ran out of attempts.
    #[error(transparent)]
    Exhausted(#[from] Exhausted),
}

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
