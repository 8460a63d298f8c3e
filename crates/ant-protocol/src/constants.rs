//! Protocol constants
//!
//! Message ids, channel event codes and framing limits for the subset of the
//! ANT serial protocol spoken by the tracker base station.

// ============================================================================
// Framing
// ============================================================================

/// Sync byte written on every outbound frame.
pub const SYNC: u8 = 0xA4;
/// Alternate sync byte some dongles use on inbound frames.
pub const SYNC_ALT: u8 = 0xA5;
/// Bytes in a frame besides its payload: sync, length, message id, checksum.
pub const FRAME_OVERHEAD: usize = 4;
/// Smallest legal value of the length byte.
pub const MIN_PAYLOAD_LEN: usize = 1;
/// Largest legal value of the length byte.
pub const MAX_PAYLOAD_LEN: usize = 32;
/// Largest frame the codec will accept.
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_LEN + FRAME_OVERHEAD;
/// Bytes carried by one burst packet: sequence/channel byte plus eight data bytes.
pub const BURST_PACKET_SIZE: usize = 9;
/// Sequence bit marking the last packet of a burst.
pub const BURST_LAST_PACKET: u8 = 0x80;

// ============================================================================
// Message ids (host -> dongle)
// ============================================================================

/// Assign channel.
pub const MSG_ASSIGN_CHANNEL: u8 = 0x42;
/// Set channel period.
pub const MSG_CHANNEL_PERIOD: u8 = 0x43;
/// Set search timeout.
pub const MSG_SEARCH_TIMEOUT: u8 = 0x44;
/// Set channel RF frequency.
pub const MSG_CHANNEL_FREQUENCY: u8 = 0x45;
/// Set network key.
pub const MSG_NETWORK_KEY: u8 = 0x46;
/// Set transmit power.
pub const MSG_TRANSMIT_POWER: u8 = 0x47;
/// Reset the ANT chip.
pub const MSG_RESET: u8 = 0x4A;
/// Open channel.
pub const MSG_OPEN_CHANNEL: u8 = 0x4B;
/// Close channel.
pub const MSG_CLOSE_CHANNEL: u8 = 0x4C;
/// Set channel id.
pub const MSG_CHANNEL_ID: u8 = 0x51;

// ============================================================================
// Message ids (both directions / dongle -> host)
// ============================================================================

/// Channel response or channel event.
pub const MSG_CHANNEL_EVENT: u8 = 0x40;
/// Broadcast data; the tracker beacon.
pub const MSG_BROADCAST_DATA: u8 = 0x4E;
/// Acknowledged data.
pub const MSG_ACKNOWLEDGED_DATA: u8 = 0x4F;
/// Burst data.
pub const MSG_BURST_DATA: u8 = 0x50;
/// Startup message sent after a reset.
pub const MSG_STARTUP: u8 = 0x6F;

// ============================================================================
// Channel event codes (third payload byte of MSG_CHANNEL_EVENT)
// ============================================================================

/// Command accepted.
pub const EVENT_RESPONSE_NO_ERROR: u8 = 0x00;
/// Burst receive failed.
pub const EVENT_TRANSFER_RX_FAILED: u8 = 0x04;
/// Acknowledged or burst transfer completed.
pub const EVENT_TRANSFER_TX_COMPLETED: u8 = 0x05;
/// Acknowledged or burst transfer failed.
pub const EVENT_TRANSFER_TX_FAILED: u8 = 0x06;
/// Transfer started.
pub const EVENT_TRANSFER_TX_START: u8 = 0x0A;

/// Status byte of the startup message expected after a command reset.
pub const STARTUP_COMMAND_RESET: u8 = 0x20;

/// Returns true for either sync byte.
pub const fn is_sync(byte: u8) -> bool {
    byte == SYNC || byte == SYNC_ALT
}
