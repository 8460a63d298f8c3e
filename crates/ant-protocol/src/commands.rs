//! Commands that can be sent to the ANT dongle.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::FrameBuilder;

/// Commands that can be sent to the ANT dongle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset the ANT chip.
    Reset,

    /// Assign a channel as a bidirectional slave on network 0.
    AssignChannel {
        /// Channel number.
        channel: u8,
    },

    /// Set the channel message period.
    ChannelPeriod {
        /// Channel number.
        channel: u8,
        /// Period, as sent on the wire.
        period: [u8; 2],
    },

    /// Set the search timeout.
    SearchTimeout {
        /// Channel number.
        channel: u8,
        /// Timeout in 2.5 second ticks; 0xFF searches forever.
        timeout: u8,
    },

    /// Set the RF frequency offset from 2400 MHz.
    ChannelFrequency {
        /// Channel number.
        channel: u8,
        /// Frequency offset.
        frequency: u8,
    },

    /// Set a network key.
    NetworkKey {
        /// Network number.
        network: u8,
        /// Eight-byte key.
        key: [u8; 8],
    },

    /// Set the transmit power.
    TransmitPower {
        /// Power level.
        power: u8,
    },

    /// Open a channel.
    OpenChannel {
        /// Channel number.
        channel: u8,
    },

    /// Close a channel.
    CloseChannel {
        /// Channel number.
        channel: u8,
    },

    /// Set the channel id (device number, device type, transmission type).
    ChannelId {
        /// Channel number.
        channel: u8,
        /// Four-byte channel id.
        id: [u8; 4],
    },

    /// Send one acknowledged data packet.
    AcknowledgedData {
        /// Channel number.
        channel: u8,
        /// Packet data.
        data: Vec<u8>,
    },

    /// Send one burst packet, already prefixed with its sequence byte.
    BurstData {
        /// Sequence/channel byte plus up to eight data bytes.
        packet: Vec<u8>,
    },
}

impl Command {
    /// The message id this command is sent with.
    pub fn message_id(&self) -> u8 {
        match self {
            Command::Reset => MSG_RESET,
            Command::AssignChannel { .. } => MSG_ASSIGN_CHANNEL,
            Command::ChannelPeriod { .. } => MSG_CHANNEL_PERIOD,
            Command::SearchTimeout { .. } => MSG_SEARCH_TIMEOUT,
            Command::ChannelFrequency { .. } => MSG_CHANNEL_FREQUENCY,
            Command::NetworkKey { .. } => MSG_NETWORK_KEY,
            Command::TransmitPower { .. } => MSG_TRANSMIT_POWER,
            Command::OpenChannel { .. } => MSG_OPEN_CHANNEL,
            Command::CloseChannel { .. } => MSG_CLOSE_CHANNEL,
            Command::ChannelId { .. } => MSG_CHANNEL_ID,
            Command::AcknowledgedData { .. } => MSG_ACKNOWLEDGED_DATA,
            Command::BurstData { .. } => MSG_BURST_DATA,
        }
    }

    /// Encode the command as a complete wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let frame = FrameBuilder::new(self.message_id());

        let frame = match self {
            Command::Reset => frame.byte(0x00),
            Command::AssignChannel { channel } => frame.byte(*channel).byte(0x00).byte(0x00),
            Command::ChannelPeriod { channel, period } => frame.byte(*channel).bytes(period),
            Command::SearchTimeout { channel, timeout } => frame.byte(*channel).byte(*timeout),
            Command::ChannelFrequency { channel, frequency } => {
                frame.byte(*channel).byte(*frequency)
            }
            Command::NetworkKey { network, key } => frame.byte(*network).bytes(key),
            // Power applies to all channels; the first byte is filler.
            Command::TransmitPower { power } => frame.byte(0x00).byte(*power),
            Command::OpenChannel { channel } => frame.byte(*channel),
            Command::CloseChannel { channel } => frame.byte(*channel),
            Command::ChannelId { channel, id } => frame.byte(*channel).bytes(id),
            Command::AcknowledgedData { channel, data } => frame.byte(*channel).bytes(data),
            Command::BurstData { packet } => frame.bytes(packet),
        };

        frame.build()
    }
}
