//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel id the tracker listens on before pairing.
pub const BROADCAST_CHANNEL_ID: [u8; 4] = [0xFF, 0xFF, 0x01, 0x01];

/// Parameters sent to the dongle before a channel is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel number.
    pub channel: u8,
    /// Network number the key is loaded into.
    pub network: u8,
    /// Network key.
    pub network_key: [u8; 8],
    /// Channel period, as sent on the wire.
    pub period: [u8; 2],
    /// RF frequency offset.
    pub frequency: u8,
    /// Transmit power.
    pub transmit_power: u8,
    /// Search timeout.
    pub search_timeout: u8,
    /// Channel id used before the tracker switches to a private one.
    pub broadcast_id: [u8; 4],
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            channel: 0,
            network: 0,
            network_key: [0; 8],
            period: [0x00, 0x10],
            frequency: 0x20,
            transmit_power: 0x30,
            search_timeout: 0xFF,
            broadcast_id: BROADCAST_CHANNEL_ID,
        }
    }
}

/// Fixed sleeps the link session observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Pause between sending a reset and polling for its startup message.
    pub reset_settle: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        LinkTiming {
            reset_settle: Duration::from_secs(1),
        }
    }
}

impl LinkTiming {
    /// No sleeps at all; for scripted transports.
    pub fn immediate() -> Self {
        LinkTiming {
            reset_settle: Duration::ZERO,
        }
    }
}
