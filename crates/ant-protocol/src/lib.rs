//! ANT serial protocol
//!
//! This crate provides framing, decoding and command encoding for the subset of
//! the ANT serial protocol used to talk to a tracker base station. It performs
//! no I/O; `fitsync-link` drives it over a byte transport.
//!
//! # Protocol Overview
//!
//! Every message is a frame `sync, length, message id, payload, checksum`:
//!
//! - **Commands** (host → dongle): configure and open a channel, or carry data
//! - **Channel events** (dongle → host): command responses and RF events
//! - **Data** (both ways): broadcast, acknowledged and burst packets
//!
//! # Example
//!
//! ```rust
//! use ant_protocol::{Command, Frame, FrameCodec, Message};
//!
//! let bytes = Command::OpenChannel { channel: 0 }.encode().unwrap();
//! assert_eq!(bytes, [0xA4, 0x01, 0x4B, 0x00, 0xEE]);
//!
//! let mut codec = FrameCodec::new();
//! codec.push(&[0xA4, 0x03, 0x40, 0x00, 0x4B, 0x00, 0xAC]);
//! let frame: Frame = codec.decode().unwrap();
//! assert!(matches!(Message::decode(&frame), Ok(Message::ChannelEvent { .. })));
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod messages;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use messages::*;
