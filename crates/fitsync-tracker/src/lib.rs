//! Tracker device session.
//!
//! [`TrackerSession`] sits on top of a [`fitsync_link::LinkSession`] and speaks
//! the tracker's packet protocol: rotating packet ids, opcodes and their
//! replies, payload uploads, data bank paging and the pairing flow that moves
//! the tracker from the broadcast channel to a private one.

pub mod error;
pub mod payload;
pub mod reply;
pub mod session;

pub use error::{TrackerError, TrackerResult};
pub use payload::{TrackerPayload, MAX_PAYLOAD_LEN};
pub use reply::{DataBankPage, ReplyKind, TrackerReply};
pub use session::{PacketIdPolicy, TrackerOptions, TrackerSession};
