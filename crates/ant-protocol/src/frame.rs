//! Frame encoding/decoding utilities.
//!
//! Every ANT message travels in a sync-delimited, XOR-checksummed frame:
//!
//! ```text
//! +------+--------+------------+----------------------+----------+
//! | sync | length | message id | payload[0..length]   | checksum |
//! +------+--------+------------+----------------------+----------+
//! ```
//!
//! The length byte counts the payload bytes after the message id, so a frame
//! occupies `length + 4` bytes. The checksum is the XOR of every preceding byte,
//! which makes the XOR over a whole valid frame zero.

use bytes::{Buf, Bytes, BytesMut};

use crate::constants::*;
use crate::error::ProtocolError;

/// XOR of all bytes in `data`.
pub fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Builder for an outbound frame.
///
/// Fields are appended in call order; only single bytes and byte slices are
/// accepted, so the length byte always matches what was written.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    message_id: u8,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a frame for the given message id.
    pub fn new(message_id: u8) -> Self {
        FrameBuilder {
            message_id,
            payload: Vec::with_capacity(MAX_PAYLOAD_LEN),
        }
    }

    /// Append one byte.
    pub fn byte(mut self, value: u8) -> Self {
        self.payload.push(value);
        self
    }

    /// Append a byte sequence.
    pub fn bytes(mut self, values: &[u8]) -> Self {
        self.payload.extend_from_slice(values);
        self
    }

    /// Serialize into wire bytes.
    pub fn build(self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                max: MAX_PAYLOAD_LEN,
                actual: len,
            });
        }
        if len < MIN_PAYLOAD_LEN {
            return Err(ProtocolError::BadLength(len as u8));
        }

        let mut buf = Vec::with_capacity(len + FRAME_OVERHEAD);
        buf.push(SYNC);
        buf.push(len as u8);
        buf.push(self.message_id);
        buf.extend_from_slice(&self.payload);
        buf.push(xor_sum(&buf));
        Ok(buf)
    }
}

/// Encode a frame with a single payload slice.
pub fn encode(message_id: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    FrameBuilder::new(message_id).bytes(payload).build()
}

/// Outcome of checking a byte window that starts with a sync byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The window ends before the declared frame does.
    NeedMore,
    /// The length byte is out of range; the stream is out of sync.
    BadLength(u8),
    /// The declared frame does not XOR to zero.
    BadChecksum,
    /// A complete frame of this many bytes sits at the start of the window.
    Complete(usize),
}

/// Check whether `window` begins with a complete, valid frame.
///
/// The length byte is range-checked before completeness, so garbage with a
/// huge length resolves as `BadLength` instead of waiting for data that will
/// never make it valid.
pub fn validate(window: &[u8]) -> Validation {
    if window.len() < 2 {
        return Validation::NeedMore;
    }
    let len = window[1];
    if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&(len as usize)) {
        return Validation::BadLength(len);
    }
    let frame_len = len as usize + FRAME_OVERHEAD;
    if window.len() < frame_len {
        return Validation::NeedMore;
    }
    if xor_sum(&window[..frame_len]) != 0 {
        return Validation::BadChecksum;
    }
    Validation::Complete(frame_len)
}

/// Index of the first sync byte in `window`, or `window.len()` when there is none.
pub fn find_sync(window: &[u8]) -> usize {
    window
        .iter()
        .position(|&b| is_sync(b))
        .unwrap_or(window.len())
}

/// A complete frame that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
}

impl Frame {
    /// Validate a buffer holding exactly one frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let min = MIN_PAYLOAD_LEN + FRAME_OVERHEAD;
        if data.len() < min {
            return Err(ProtocolError::FrameTooShort {
                expected: min,
                actual: data.len(),
            });
        }
        if !is_sync(data[0]) {
            return Err(ProtocolError::BadSync(data[0]));
        }
        match validate(data) {
            Validation::Complete(len) if len == data.len() => Ok(Frame {
                raw: Bytes::copy_from_slice(data),
            }),
            // Trailing bytes past the declared frame.
            Validation::Complete(_) => Err(ProtocolError::BadLength(data[1])),
            Validation::BadLength(len) => Err(ProtocolError::BadLength(len)),
            Validation::BadChecksum => Err(ProtocolError::BadChecksum),
            Validation::NeedMore => Err(ProtocolError::FrameTooShort {
                expected: data[1] as usize + FRAME_OVERHEAD,
                actual: data.len(),
            }),
        }
    }

    /// The sync byte this frame arrived with.
    pub fn sync(&self) -> u8 {
        self.raw[0]
    }

    /// The message id.
    pub fn message_id(&self) -> u8 {
        self.raw[2]
    }

    /// Payload bytes between the message id and the checksum.
    pub fn payload(&self) -> &[u8] {
        &self.raw[3..self.raw.len() - 1]
    }

    /// The whole frame as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Total frame size in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Frames are never empty; provided for API completeness.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Incremental frame decoder owning the receive backlog.
///
/// Bytes are pushed as they arrive; partial frames stay buffered across
/// calls. Garbage before a sync byte is dropped, and a sync byte that heads
/// a bad length or a bad checksum is dropped one byte at a time until a
/// valid frame lines up.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Bytes dropped while hunting for sync since creation.
    discarded: u64,
    /// Candidate frames rejected for bad length or checksum.
    rejected: u64,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(4096),
            discarded: 0,
            rejected: 0,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drop everything before the next sync byte. Returns the number of bytes dropped.
    pub fn resync(&mut self) -> usize {
        let skip = find_sync(&self.buffer);
        if skip > 0 {
            log::debug!("discarding {} bytes: {:02x?}", skip, &self.buffer[..skip]);
            self.buffer.advance(skip);
            self.discarded += skip as u64;
        }
        skip
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `Some(frame)` if a complete frame is available, or `None` if
    /// more data is needed.
    pub fn decode(&mut self) -> Option<Frame> {
        loop {
            self.resync();
            match validate(&self.buffer) {
                Validation::NeedMore => return None,
                Validation::BadLength(len) => {
                    log::trace!("bad length byte {len}, skipping sync byte");
                    self.rejected += 1;
                    self.buffer.advance(1);
                }
                Validation::BadChecksum => {
                    log::trace!("checksum mismatch, skipping sync byte");
                    self.rejected += 1;
                    self.buffer.advance(1);
                }
                Validation::Complete(len) => {
                    let raw = self.buffer.split_to(len).freeze();
                    return Some(Frame { raw });
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Total candidate frames rejected for bad length or checksum.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_open_channel() {
        let frame = FrameBuilder::new(MSG_OPEN_CHANNEL).byte(0x00).build().unwrap();
        assert_eq!(frame, vec![0xA4, 0x01, 0x4B, 0x00, 0xEE]);
    }

    #[test]
    fn test_encode_mixed_fields() {
        let frame = FrameBuilder::new(MSG_CHANNEL_PERIOD)
            .byte(0x00)
            .bytes(&[0x00, 0x10])
            .build()
            .unwrap();
        assert_eq!(&frame[..5], &[0xA4, 0x03, 0x43, 0x00, 0x00]);
        assert_eq!(frame[5], 0x10);
        assert_eq!(xor_sum(&frame), 0);
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let err = encode(MSG_BURST_DATA, &[0u8; 33]).unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLong { max: 32, actual: 33 });
    }

    #[test]
    fn test_encode_rejects_empty_payload() {
        assert_eq!(encode(MSG_RESET, &[]), Err(ProtocolError::BadLength(0)));
    }

    #[test]
    fn test_round_trip_all_payload_sizes() {
        for len in MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let bytes = encode(0x4F, &payload).unwrap();
            assert_eq!(validate(&bytes), Validation::Complete(len + FRAME_OVERHEAD));

            let frame = Frame::from_bytes(&bytes).unwrap();
            assert_eq!(frame.message_id(), 0x4F);
            assert_eq!(frame.payload(), &payload[..]);
        }
    }

    #[test]
    fn test_single_bit_flip_breaks_checksum() {
        let bytes = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x38, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
        // Flipping the length byte reframes the window instead.
        for index in (0..bytes.len()).filter(|&i| i != 1) {
            for bit in 0..8 {
                let mut corrupt = bytes.clone();
                corrupt[index] ^= 1 << bit;
                assert_eq!(validate(&corrupt), Validation::BadChecksum, "byte {index} bit {bit}");
            }
        }
    }

    #[test]
    fn test_validate_need_more() {
        let bytes = encode(MSG_OPEN_CHANNEL, &[0x00]).unwrap();
        assert_eq!(validate(&bytes[..1]), Validation::NeedMore);
        assert_eq!(validate(&bytes[..4]), Validation::NeedMore);
    }

    #[test]
    fn test_validate_bad_length_without_waiting() {
        assert_eq!(validate(&[0xA4, 33]), Validation::BadLength(33));
        assert_eq!(validate(&[0xA4, 0, 0x4B, 0xEF]), Validation::BadLength(0));
    }

    #[test]
    fn test_find_sync() {
        assert_eq!(find_sync(&[0x01, 0x02, 0xA5, 0xA4]), 2);
        assert_eq!(find_sync(&[0x01, 0x02]), 2);
        assert_eq!(find_sync(&[]), 0);
    }

    #[test]
    fn test_codec_skips_garbage_prefix() {
        let mut codec = FrameCodec::new();
        let garbage = [0x00, 0x11, 0x22, 0x33, 0x7F];
        codec.push(&garbage);
        codec.push(&encode(MSG_OPEN_CHANNEL, &[0x00]).unwrap());

        assert_eq!(codec.resync(), garbage.len());
        let frame = codec.decode().expect("should decode frame");
        assert_eq!(frame.message_id(), MSG_OPEN_CHANNEL);
        assert_eq!(codec.discarded(), garbage.len() as u64);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_codec_bad_length_advances_one_byte() {
        let mut codec = FrameCodec::new();
        // A sync byte followed by an impossible length, then a real frame.
        codec.push(&[0xA4, 33]);
        codec.push(&encode(MSG_CLOSE_CHANNEL, &[0x00]).unwrap());

        let frame = codec.decode().expect("should decode frame");
        assert_eq!(frame.message_id(), MSG_CLOSE_CHANNEL);
        assert_eq!(codec.rejected(), 1);
        // Only the 0x21 length byte was hunted over as garbage.
        assert_eq!(codec.discarded(), 1);
    }

    #[test]
    fn test_codec_partial() {
        let mut codec = FrameCodec::new();
        let bytes = encode(MSG_BURST_DATA, &[0x01, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        codec.push(&bytes[..6]);
        assert!(codec.decode().is_none());
        assert_eq!(codec.buffered_len(), 6);

        codec.push(&bytes[6..]);
        let frame = codec.decode().expect("should decode frame");
        assert_eq!(frame.payload(), &[0x01, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_codec_multiple_and_alt_sync() {
        let mut codec = FrameCodec::new();
        let mut second = encode(MSG_BROADCAST_DATA, &[0x00, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        // Re-sign the frame with the alternate sync byte.
        second[0] = SYNC_ALT;
        let last = second.len() - 1;
        second[last] = xor_sum(&second[..last]);

        codec.push(&encode(MSG_OPEN_CHANNEL, &[0x00]).unwrap());
        codec.push(&second);

        assert_eq!(codec.decode().unwrap().message_id(), MSG_OPEN_CHANNEL);
        let frame = codec.decode().unwrap();
        assert_eq!(frame.sync(), SYNC_ALT);
        assert_eq!(frame.message_id(), MSG_BROADCAST_DATA);
        assert!(codec.decode().is_none());
    }

    #[test]
    fn test_frame_from_bytes_errors() {
        assert_eq!(
            Frame::from_bytes(&[0xA4, 0x01, 0x4B, 0x00, 0xEF]),
            Err(ProtocolError::BadChecksum)
        );
        assert_eq!(Frame::from_bytes(&[0xA4, 40, 0, 0, 0]), Err(ProtocolError::BadLength(40)));
        assert!(matches!(
            Frame::from_bytes(&[0xA4, 0x01, 0x4B]),
            Err(ProtocolError::FrameTooShort { .. })
        ));
    }
}
