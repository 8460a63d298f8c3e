//! Upload payload encoding.
//!
//! A payload goes out as one burst: a nine-byte header packet followed by the
//! payload in eight-byte chunks, each behind a control byte.

use ant_protocol::{xor_sum, BURST_LAST_PACKET, BURST_PACKET_SIZE};

use crate::error::{TrackerError, TrackerResult};

/// Largest payload the one-byte header length can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

const CHUNK_DATA_LEN: usize = BURST_PACKET_SIZE - 1;
const HEADER_FLAG: u8 = 0x80;
const CHUNK_PREFIXES: [u8; 3] = [0x20, 0x40, 0x60];

/// A payload ready to be encoded for upload.
#[derive(Debug, Clone, Copy)]
pub struct TrackerPayload<'a> {
    /// Packet id carried in the header.
    pub packet_id: u8,
    /// Channel number OR'd into each chunk prefix.
    pub channel: u8,
    /// The payload.
    pub data: &'a [u8],
}

impl TrackerPayload<'_> {
    /// Encode header and chunks as one burst buffer of nine-byte packets.
    pub fn encode(&self) -> TrackerResult<Vec<u8>> {
        let len = u8::try_from(self.data.len()).map_err(|_| TrackerError::PayloadTooLarge {
            len: self.data.len(),
            max: MAX_PAYLOAD_LEN,
        })?;

        let chunks = self.data.len().div_ceil(CHUNK_DATA_LEN);
        let mut out = Vec::with_capacity((chunks + 1) * BURST_PACKET_SIZE);
        out.extend_from_slice(&[
            0x00,
            self.packet_id,
            HEADER_FLAG,
            len,
            0,
            0,
            0,
            0,
            xor_sum(self.data),
        ]);

        for (index, chunk) in self.data.chunks(CHUNK_DATA_LEN).enumerate() {
            let mut prefix = CHUNK_PREFIXES[index % CHUNK_PREFIXES.len()] | self.channel;
            if index + 1 == chunks {
                prefix |= BURST_LAST_PACKET;
            }
            let start = out.len();
            out.push(prefix);
            out.extend_from_slice(chunk);
            out.resize(start + BURST_PACKET_SIZE, 0);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let payload = [0x01, 0x02, 0x04];
        let out = TrackerPayload {
            packet_id: 0x3A,
            channel: 0,
            data: &payload,
        }
        .encode()
        .unwrap();

        assert_eq!(&out[..9], &[0x00, 0x3A, 0x80, 3, 0, 0, 0, 0, 0x07]);
        assert_eq!(&out[9..], &[0xA0, 0x01, 0x02, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_chunk_prefixes_rotate() {
        let payload: Vec<u8> = (1..=30).collect();
        let out = TrackerPayload {
            packet_id: 0x38,
            channel: 0x01,
            data: &payload,
        }
        .encode()
        .unwrap();

        // Header plus four chunks, each padded to nine bytes.
        assert_eq!(out.len(), 5 * 9);
        let prefixes: Vec<u8> = out.chunks(9).skip(1).map(|c| c[0]).collect();
        assert_eq!(prefixes, vec![0x21, 0x41, 0x61, 0xA1]);
        assert_eq!(&out[36..], &[0xA1, 25, 26, 27, 28, 29, 30, 0, 0]);
    }

    #[test]
    fn test_exact_multiple_marks_last_chunk() {
        let payload = [0xFFu8; 16];
        let out = TrackerPayload {
            packet_id: 0x38,
            channel: 0,
            data: &payload,
        }
        .encode()
        .unwrap();
        assert_eq!(out.len(), 27);
        assert_eq!(out[9], 0x20);
        assert_eq!(out[18], 0xC0);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; 256];
        let err = TrackerPayload {
            packet_id: 0x38,
            channel: 0,
            data: &payload,
        }
        .encode()
        .unwrap_err();
        assert!(matches!(
            err,
            TrackerError::PayloadTooLarge { len: 256, max: 255 }
        ));
    }
}
