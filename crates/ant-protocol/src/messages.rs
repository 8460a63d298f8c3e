//! Messages received from the ANT dongle.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::Frame;

/// Event code carried by a channel response/event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    /// Command accepted.
    ResponseNoError,
    /// Burst receive failed.
    TransferRxFailed,
    /// Transfer completed.
    TransferTxCompleted,
    /// Transfer failed.
    TransferTxFailed,
    /// Transfer started.
    TransferTxStart,
    /// Any code this host does not act on.
    Other(u8),
}

impl From<u8> for EventCode {
    fn from(code: u8) -> Self {
        match code {
            EVENT_RESPONSE_NO_ERROR => EventCode::ResponseNoError,
            EVENT_TRANSFER_RX_FAILED => EventCode::TransferRxFailed,
            EVENT_TRANSFER_TX_COMPLETED => EventCode::TransferTxCompleted,
            EVENT_TRANSFER_TX_FAILED => EventCode::TransferTxFailed,
            EVENT_TRANSFER_TX_START => EventCode::TransferTxStart,
            other => EventCode::Other(other),
        }
    }
}

impl From<EventCode> for u8 {
    fn from(code: EventCode) -> Self {
        match code {
            EventCode::ResponseNoError => EVENT_RESPONSE_NO_ERROR,
            EventCode::TransferRxFailed => EVENT_TRANSFER_RX_FAILED,
            EventCode::TransferTxCompleted => EVENT_TRANSFER_TX_COMPLETED,
            EventCode::TransferTxFailed => EVENT_TRANSFER_TX_FAILED,
            EventCode::TransferTxStart => EVENT_TRANSFER_TX_START,
            EventCode::Other(code) => code,
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCode::ResponseNoError => write!(f, "response no error"),
            EventCode::TransferRxFailed => write!(f, "transfer rx failed"),
            EventCode::TransferTxCompleted => write!(f, "transfer tx completed"),
            EventCode::TransferTxFailed => write!(f, "transfer tx failed"),
            EventCode::TransferTxStart => write!(f, "transfer tx start"),
            EventCode::Other(code) => write!(f, "event 0x{:02X}", code),
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Channel response (to a command) or channel event (RF activity).
    ChannelEvent {
        /// Channel number.
        channel: u8,
        /// Message id being responded to, or 0x01 for RF events.
        message_id: u8,
        /// Event code.
        code: EventCode,
    },

    /// Startup message emitted after a reset.
    Startup {
        /// Reset reason bits.
        status: u8,
    },

    /// Broadcast data (tracker beacon).
    Broadcast {
        /// Channel number.
        channel: u8,
        /// Data bytes after the channel byte.
        data: Vec<u8>,
    },

    /// Acknowledged data.
    Acknowledged {
        /// Channel number.
        channel: u8,
        /// Data bytes after the channel byte.
        data: Vec<u8>,
    },

    /// One packet of a burst.
    Burst {
        /// Sequence/channel byte as received.
        sequence: u8,
        /// Data bytes after the sequence byte.
        data: Vec<u8>,
    },

    /// Anything else.
    Other {
        /// Message id.
        message_id: u8,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

impl Message {
    /// Decode a message from a validated frame.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let payload = frame.payload();

        match frame.message_id() {
            MSG_CHANNEL_EVENT => {
                require(frame, 3)?;
                Ok(Message::ChannelEvent {
                    channel: payload[0],
                    message_id: payload[1],
                    code: EventCode::from(payload[2]),
                })
            }

            MSG_STARTUP => Ok(Message::Startup { status: payload[0] }),

            MSG_BROADCAST_DATA => Ok(Message::Broadcast {
                channel: payload[0],
                data: payload[1..].to_vec(),
            }),

            MSG_ACKNOWLEDGED_DATA => Ok(Message::Acknowledged {
                channel: payload[0],
                data: payload[1..].to_vec(),
            }),

            MSG_BURST_DATA => Ok(Message::Burst {
                sequence: payload[0],
                data: payload[1..].to_vec(),
            }),

            message_id => Ok(Message::Other {
                message_id,
                payload: payload.to_vec(),
            }),
        }
    }

    /// True for the final packet of a burst.
    pub fn is_last_burst_packet(&self) -> bool {
        matches!(self, Message::Burst { sequence, .. } if sequence & BURST_LAST_PACKET != 0)
    }
}

fn require(frame: &Frame, payload_len: usize) -> Result<(), ProtocolError> {
    let actual = frame.payload().len();
    if actual < payload_len {
        return Err(ProtocolError::FrameTooShort {
            expected: payload_len + FRAME_OVERHEAD,
            actual: frame.len(),
        });
    }
    Ok(())
}
