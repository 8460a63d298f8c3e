//! Tracker replies and data bank pages.

/// Reply code: the response follows immediately.
pub const REPLY_IMMEDIATE: u8 = 0x41;
/// Reply code: the response must be read from the data bank.
pub const REPLY_ENTER_DATA_BANK: u8 = 0x42;
/// Reply code: the tracker waits for an upload payload.
pub const REPLY_READY_FOR_PAYLOAD: u8 = 0x61;

/// Bytes of header in front of each data bank page body.
pub const DATA_BANK_PAGE_HEADER: usize = 8;

/// What the tracker wants after an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Response data is in this reply.
    Immediate,
    /// Response data must be paged out of the data bank.
    EnterDataBank,
    /// The tracker expects a payload upload.
    ReadyForPayload,
    /// A code this host does not handle.
    Unrecognized(u8),
}

impl From<u8> for ReplyKind {
    fn from(code: u8) -> Self {
        match code {
            REPLY_IMMEDIATE => ReplyKind::Immediate,
            REPLY_ENTER_DATA_BANK => ReplyKind::EnterDataBank,
            REPLY_READY_FOR_PAYLOAD => ReplyKind::ReadyForPayload,
            other => ReplyKind::Unrecognized(other),
        }
    }
}

/// An acknowledged reply from the tracker: echoed packet id, reply code, data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerReply {
    /// Packet id the tracker echoed.
    pub packet_id: u8,
    /// Decoded reply code.
    pub kind: ReplyKind,
    raw: Vec<u8>,
}

impl TrackerReply {
    /// Parse a reply. Returns `None` when it is too short to carry a code.
    pub fn parse(raw: Vec<u8>) -> Option<Self> {
        if raw.len() < 2 {
            return None;
        }
        Some(TrackerReply {
            packet_id: raw[0],
            kind: ReplyKind::from(raw[1]),
            raw,
        })
    }

    /// Everything after the packet id, reply code included.
    pub fn body(&self) -> &[u8] {
        &self.raw[1..]
    }

    /// Consume the reply, returning everything after the packet id.
    pub fn into_body(mut self) -> Vec<u8> {
        self.raw.remove(0);
        self.raw
    }
}

/// Byte 1 of every data bank page.
pub const TRACKER_BURST_MARKER: u8 = 0x81;

/// A response to a data bank request, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBankPage<'a> {
    /// Body of a page with data.
    Page(&'a [u8]),
    /// The empty page that ends the bank.
    End,
    /// Byte 1 is not [`TRACKER_BURST_MARKER`]; holds what was there instead.
    NotTrackerBurst(Option<u8>),
}

/// Classify a data bank response.
///
/// The size field is `d[3] << 8 | d[2]`; a body shorter than declared is
/// clamped. A marked page too short to carry a size ends the bank.
pub fn data_bank_page(page: &[u8]) -> DataBankPage<'_> {
    match page.get(1) {
        Some(&TRACKER_BURST_MARKER) => {}
        other => return DataBankPage::NotTrackerBurst(other.copied()),
    }
    if page.len() < 4 {
        return DataBankPage::End;
    }
    let size = (page[3] as usize) << 8 | page[2] as usize;
    if size == 0 {
        return DataBankPage::End;
    }
    let start = DATA_BANK_PAGE_HEADER.min(page.len());
    let end = (DATA_BANK_PAGE_HEADER + size).min(page.len());
    DataBankPage::Page(&page[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_kinds() {
        assert_eq!(ReplyKind::from(0x41), ReplyKind::Immediate);
        assert_eq!(ReplyKind::from(0x42), ReplyKind::EnterDataBank);
        assert_eq!(ReplyKind::from(0x61), ReplyKind::ReadyForPayload);
        assert_eq!(ReplyKind::from(0x7F), ReplyKind::Unrecognized(0x7F));
    }

    #[test]
    fn test_parse_reply() {
        let reply = TrackerReply::parse(vec![0x39, 0x41, 0x01, 0x02]).unwrap();
        assert_eq!(reply.packet_id, 0x39);
        assert_eq!(reply.kind, ReplyKind::Immediate);
        assert_eq!(reply.body(), &[0x41, 0x01, 0x02]);
        assert_eq!(reply.into_body(), vec![0x41, 0x01, 0x02]);

        assert!(TrackerReply::parse(vec![0x39]).is_none());
    }

    #[test]
    fn test_page_size_byte_order() {
        // Size 0x0102 is carried as d[2] = 0x02, d[3] = 0x01.
        let mut page = vec![0x00, 0x81, 0x02, 0x01, 0, 0, 0, 0];
        page.extend(std::iter::repeat(0xAB).take(0x0102));
        match data_bank_page(&page) {
            DataBankPage::Page(body) => assert_eq!(body.len(), 0x0102),
            other => panic!("expected a page, got {:?}", other),
        }
    }

    #[test]
    fn test_page_clamped_and_terminal() {
        let page = [0x00, 0x81, 0x10, 0x00, 0, 0, 0, 0, 1, 2, 3];
        assert_eq!(data_bank_page(&page), DataBankPage::Page(&[1, 2, 3]));

        let empty = [0x00, 0x81, 0x00, 0x00, 0, 0, 0, 0];
        assert_eq!(data_bank_page(&empty), DataBankPage::End);
        assert_eq!(data_bank_page(&[0x00, 0x81]), DataBankPage::End);
    }

    #[test]
    fn test_page_without_marker_rejected() {
        let ack = [0x38, 0x41, 0x05, 0x00, 0x09, 0x09, 0x09, 0x09, 0x01, 0x02];
        assert_eq!(data_bank_page(&ack), DataBankPage::NotTrackerBurst(Some(0x41)));
        assert_eq!(data_bank_page(&[0x00]), DataBankPage::NotTrackerBurst(None));
        assert_eq!(data_bank_page(&[]), DataBankPage::NotTrackerBurst(None));
    }
}
