//! ANT channel session.
//!
//! [`LinkSession`] drives one ANT channel over a blocking [`Transport`]:
//! configuring the dongle, exchanging acknowledged data and sending and
//! collecting bursts. All polling is bounded by the named ceilings in
//! [`retry`].
//!
//! ```rust
//! use fitsync_link::{LinkSession, LinkTiming, ScriptedTransport};
//!
//! let mut transport = ScriptedTransport::new();
//! // Channel response: open channel accepted.
//! transport.queue(vec![0xA4, 0x03, 0x40, 0x00, 0x4B, 0x00, 0xAC]);
//!
//! let mut link = LinkSession::with_timing(transport, 0, LinkTiming::immediate());
//! link.open_channel().unwrap();
//! assert_eq!(link.transport().written()[0], [0xA4, 0x01, 0x4B, 0x00, 0xEE]);
//! ```

pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod transport;

pub use config::{ChannelConfig, LinkTiming, BROADCAST_CHANNEL_ID};
pub use error::{LinkError, LinkResult};
pub use retry::{Exhausted, Operation, Retry, Step};
pub use session::LinkSession;
pub use transport::{ScriptedTransport, Transport};
