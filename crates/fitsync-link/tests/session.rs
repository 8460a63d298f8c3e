//! Link session behavior over a scripted transport.

use std::time::Duration;

use ant_protocol::{encode, MSG_ACKNOWLEDGED_DATA, MSG_BURST_DATA, MSG_CHANNEL_EVENT};
use fitsync_link::retry::Operation;
use fitsync_link::{LinkError, LinkSession, LinkTiming, ScriptedTransport};

fn link(transport: ScriptedTransport) -> LinkSession<ScriptedTransport> {
    LinkSession::with_timing(transport, 0, LinkTiming::immediate())
}

fn tx_event(code: u8) -> Vec<u8> {
    encode(MSG_CHANNEL_EVENT, &[0x00, 0x01, code]).unwrap()
}

#[test]
fn test_resync_skips_exactly_the_garbage_prefix() {
    let garbage = vec![0x00, 0x13, 0x37, 0xFF, 0x42];
    let frame = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0xDE, 0xAD]).unwrap();

    let mut transport = ScriptedTransport::new();
    transport.queue([garbage, frame.clone()].concat());

    let mut link = link(transport);
    let received = link.receive_frame().unwrap();
    assert_eq!(received.as_bytes(), frame.as_slice());
    assert_eq!(link.buffered_len(), 0);
}

#[test]
fn test_out_of_range_length_drops_one_byte_and_continues() {
    // Sync byte followed by a length of 33, then a valid frame.
    let frame = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x01]).unwrap();
    let mut transport = ScriptedTransport::new();
    transport.queue([vec![0xA4, 33], frame.clone()].concat());

    let mut link = link(transport);
    assert_eq!(link.receive_frame().unwrap().as_bytes(), frame.as_slice());
}

#[test]
fn test_corrupted_frame_is_skipped() {
    let mut bad = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x01, 0x02]).unwrap();
    bad[4] ^= 0x10;
    let good = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x03]).unwrap();

    let mut transport = ScriptedTransport::new();
    transport.queue([bad, good.clone()].concat());

    let mut link = link(transport);
    assert_eq!(link.receive_frame().unwrap().as_bytes(), good.as_slice());
}

#[test]
fn test_burst_reassembles_in_three_polls() {
    let a = encode(MSG_BURST_DATA, &[0x00, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let b = encode(MSG_BURST_DATA, &[0x20, 9, 10, 11, 12, 13, 14, 15, 16]).unwrap();
    let c = encode(MSG_BURST_DATA, &[0xC0, 17, 18]).unwrap();
    let trailing = tx_event(0x05);

    let mut transport = ScriptedTransport::new();
    transport
        .queue(a)
        .queue(b)
        .queue(c)
        .queue(trailing.clone());

    let mut link = link(transport);
    let data = link.check_burst_response().unwrap();
    assert_eq!(data, (1..=18).collect::<Vec<u8>>());
    assert_eq!(link.transport().reads(), 3);
    assert_eq!(link.transport().pending(), 1);
}

#[test]
fn test_burst_end_not_detected() {
    let mut transport = ScriptedTransport::new();
    transport.queue(encode(MSG_BURST_DATA, &[0x00, 1]).unwrap());

    let mut link = link(transport);
    assert!(matches!(
        link.check_burst_response(),
        Err(LinkError::BurstEndNotDetected { polls: 128 })
    ));
}

#[test]
fn test_acknowledged_send_succeeds_after_start_event() {
    let mut transport = ScriptedTransport::new();
    transport.queue(tx_event(0x0A)).queue(tx_event(0x05));

    let mut link = link(transport);
    link.send_acknowledged_data(&[0x78, 0x00, 0, 0, 0, 0, 0, 0])
        .unwrap();
    assert_eq!(
        link.transport().written(),
        &[encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x78, 0x00, 0, 0, 0, 0, 0, 0]).unwrap()]
    );
}

#[test]
fn test_acknowledged_send_resends_after_transmit_failure() {
    let mut transport = ScriptedTransport::new();
    transport.queue(tx_event(0x06)).queue(tx_event(0x05));

    let mut link = link(transport);
    link.send_acknowledged_data(&[1, 2, 3]).unwrap();
    assert_eq!(link.transport().written().len(), 2);
}

#[test]
fn test_acknowledged_send_reports_transmit_failure() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..8 {
        transport.queue(tx_event(0x06));
    }

    let mut link = link(transport);
    assert!(matches!(
        link.send_acknowledged_data(&[1]),
        Err(LinkError::TransmitFailed)
    ));
    assert_eq!(link.transport().written().len(), 8);
}

#[test]
fn test_acknowledged_send_times_out() {
    let mut link = link(ScriptedTransport::new());
    assert!(matches!(
        link.send_acknowledged_data(&[1]),
        Err(LinkError::NoAcknowledgement { polls: 16 })
    ));
    assert_eq!(link.transport().written().len(), 8);
}

#[test]
fn test_acknowledged_reply_strips_envelope() {
    let mut transport = ScriptedTransport::new();
    transport
        .queue(tx_event(0x05))
        .queue(encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x38, 0x41, 0xAA]).unwrap());

    let mut link = link(transport);
    assert_eq!(
        link.receive_acknowledged_reply().unwrap(),
        vec![0x38, 0x41, 0xAA]
    );
}

#[test]
fn test_burst_send_retries_whole_burst_on_write_error() {
    let mut transport = ScriptedTransport::new();
    transport.fail_next_writes(1);
    transport.queue(tx_event(0x05));

    let mut link = link(transport);
    link.send_burst_data(&[0u8; 18], Duration::ZERO).unwrap();
    // First attempt dies on its first packet; the second sends both.
    assert_eq!(link.transport().written().len(), 2);
}

#[test]
fn test_acknowledged_reply_gives_up_after_thirty_polls() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..30 {
        transport.queue(tx_event(0x05));
    }
    // Arrives one poll too late.
    transport.queue(encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 0x38, 0x41]).unwrap());

    let mut link = link(transport);
    match link.receive_acknowledged_reply() {
        Err(LinkError::Exhausted(exhausted)) => {
            assert_eq!(exhausted.operation, Operation::AcknowledgedReply);
            assert_eq!(exhausted.attempts, 30);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(link.transport().pending(), 1);
}

#[test]
fn test_burst_send_returns_last_error_after_four_attempts() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.queue(tx_event(0x06));
    }
    // Never reached.
    transport.queue(tx_event(0x05));

    let mut link = link(transport);
    assert!(matches!(
        link.send_burst_data(&[0u8; 9], Duration::ZERO),
        Err(LinkError::TransmitFailed)
    ));
    assert_eq!(link.transport().written().len(), 4);
    assert_eq!(link.transport().pending(), 1);
}
