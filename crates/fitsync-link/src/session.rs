//! The ANT channel session.
//!
//! [`LinkSession`] owns the transport, the receive backlog and the channel
//! number. Every receive goes through one primitive that reads until the
//! backlog yields a valid frame; the higher level operations layer their own
//! bounded polling on top of it.

use std::thread;
use std::time::Duration;

use ant_protocol::{
    Command, EventCode, Frame, FrameCodec, Message, BURST_PACKET_SIZE, STARTUP_COMMAND_RESET,
};
use fitsync_metrics::{metric_defs, metrics};

use crate::config::{ChannelConfig, LinkTiming};
use crate::error::{LinkError, LinkResult};
use crate::retry::{
    Operation, Step, ACK_REPLY_POLL, ACK_SEND, BEACON_POLL, BURST_RECEIVE_POLL, BURST_SEND,
    READ_ATTEMPTS, RESET_POLL, TX_STATUS_POLL,
};
use crate::transport::Transport;

/// Read buffer size for ordinary receives.
pub const DEFAULT_READ_SIZE: usize = 4096;
/// Read buffer size while waiting for an acknowledged reply.
pub const ACK_REPLY_READ_SIZE: usize = 13;

/// A session on one ANT channel.
pub struct LinkSession<T> {
    transport: T,
    codec: FrameCodec,
    channel: u8,
    timing: LinkTiming,
    read_buf: Vec<u8>,
}

impl<T: Transport> LinkSession<T> {
    /// Create a session on `channel` with default timing.
    pub fn new(transport: T, channel: u8) -> Self {
        Self::with_timing(transport, channel, LinkTiming::default())
    }

    /// Create a session with explicit timing.
    pub fn with_timing(transport: T, channel: u8, timing: LinkTiming) -> Self {
        LinkSession {
            transport,
            codec: FrameCodec::new(),
            channel,
            timing,
            read_buf: vec![0; DEFAULT_READ_SIZE],
        }
    }

    /// Channel number commands are sent on.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Bytes held in the receive backlog.
    pub fn buffered_len(&self) -> usize {
        self.codec.buffered_len()
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session, returning the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    // ------------------------------------------------------------------
    // Receive
    // ------------------------------------------------------------------

    /// Receive the next valid frame.
    ///
    /// Fails with [`LinkError::ReadFailed`] after three consecutive reads
    /// that error or return nothing.
    pub fn receive_frame(&mut self) -> LinkResult<Frame> {
        self.receive_sized(DEFAULT_READ_SIZE)
    }

    /// Receive and decode the next message.
    pub fn receive_message(&mut self) -> LinkResult<Message> {
        let frame = self.receive_frame()?;
        Ok(Message::decode(&frame)?)
    }

    fn receive_sized(&mut self, read_size: usize) -> LinkResult<Frame> {
        let mut failures = 0;
        loop {
            if let Some(frame) = self.decode_buffered() {
                return Ok(frame);
            }
            if failures >= READ_ATTEMPTS {
                return Err(LinkError::ReadFailed { attempts: failures });
            }

            if self.read_buf.len() < read_size {
                self.read_buf.resize(read_size, 0);
            }
            match Transport::read(&mut self.transport, &mut self.read_buf[..read_size]) {
                Ok(0) => {
                    failures += 1;
                    log::trace!("empty read");
                }
                Ok(n) => {
                    failures = 0;
                    self.codec.push(&self.read_buf[..n]);
                }
                Err(e) => {
                    failures += 1;
                    log::debug!("read failed: {}", e);
                }
            }
        }
    }

    fn decode_buffered(&mut self) -> Option<Frame> {
        let discarded = self.codec.discarded();
        let rejected = self.codec.rejected();
        let frame = self.codec.decode();

        let discarded = self.codec.discarded() - discarded;
        if discarded > 0 {
            metrics::counter!(metric_defs::LINK_RESYNC_DISCARDED.name).increment(discarded);
        }
        let rejected = self.codec.rejected() - rejected;
        if rejected > 0 {
            metrics::counter!(metric_defs::LINK_FRAMES_REJECTED.name).increment(rejected);
        }

        if let Some(frame) = &frame {
            log::trace!("recv: {:02x?}", frame.as_bytes());
            metrics::counter!(
                metric_defs::LINK_FRAMES_RX.name,
                "message_id" => format!("0x{:02x}", frame.message_id())
            )
            .increment(1);
        }
        frame
    }

    // ------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------

    /// Encode and write one command.
    pub fn send_message(&mut self, command: &Command) -> LinkResult<()> {
        let frame = command.encode()?;
        self.send_frame(&frame)
    }

    /// Write an already encoded frame. Transport errors are returned as is.
    pub fn send_frame(&mut self, frame: &[u8]) -> LinkResult<()> {
        log::debug!("send: {:02x?}", frame);
        Transport::write_all(&mut self.transport, frame)?;
        if let Some(id) = frame.get(2) {
            metrics::counter!(
                metric_defs::LINK_FRAMES_TX.name,
                "message_id" => format!("0x{:02x}", id)
            )
            .increment(1);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channel setup
    // ------------------------------------------------------------------

    /// Reset the dongle and wait for its startup message.
    pub fn reset(&mut self) -> LinkResult<()> {
        self.send_message(&Command::Reset)?;
        if !self.timing.reset_settle.is_zero() {
            thread::sleep(self.timing.reset_settle);
        }

        RESET_POLL.run(|_| match self.receive_message() {
            Ok(Message::Startup { status }) if status == STARTUP_COMMAND_RESET => Step::Done(()),
            Ok(message) => {
                log::debug!("waiting for reset, got {:?}", message);
                Step::Again
            }
            Err(e) => {
                log::debug!("waiting for reset: {}", e);
                Step::Again
            }
        })
    }

    /// Wait for one channel response and require "no error".
    pub fn check_ok_response(&mut self) -> LinkResult<()> {
        match self.receive_message()? {
            Message::ChannelEvent {
                code: EventCode::ResponseNoError,
                ..
            } => Ok(()),
            Message::ChannelEvent {
                message_id, code, ..
            } => Err(LinkError::ChannelResponse { message_id, code }),
            message => Err(LinkError::UnexpectedMessage {
                waiting_for: "channel response",
                message,
            }),
        }
    }

    fn command(&mut self, command: Command) -> LinkResult<()> {
        self.send_message(&command)?;
        self.check_ok_response()
    }

    /// Load a network key.
    pub fn set_network_key(&mut self, network: u8, key: [u8; 8]) -> LinkResult<()> {
        self.command(Command::NetworkKey { network, key })
    }

    /// Assign the channel.
    pub fn assign_channel(&mut self) -> LinkResult<()> {
        self.command(Command::AssignChannel {
            channel: self.channel,
        })
    }

    /// Set the channel period.
    pub fn set_channel_period(&mut self, period: [u8; 2]) -> LinkResult<()> {
        self.command(Command::ChannelPeriod {
            channel: self.channel,
            period,
        })
    }

    /// Set the RF frequency.
    pub fn set_channel_frequency(&mut self, frequency: u8) -> LinkResult<()> {
        self.command(Command::ChannelFrequency {
            channel: self.channel,
            frequency,
        })
    }

    /// Set the transmit power.
    pub fn set_transmit_power(&mut self, power: u8) -> LinkResult<()> {
        self.command(Command::TransmitPower { power })
    }

    /// Set the search timeout.
    pub fn set_search_timeout(&mut self, timeout: u8) -> LinkResult<()> {
        self.command(Command::SearchTimeout {
            channel: self.channel,
            timeout,
        })
    }

    /// Set the channel id.
    pub fn set_channel_id(&mut self, id: [u8; 4]) -> LinkResult<()> {
        self.command(Command::ChannelId {
            channel: self.channel,
            id,
        })
    }

    /// Open the channel.
    pub fn open_channel(&mut self) -> LinkResult<()> {
        self.command(Command::OpenChannel {
            channel: self.channel,
        })
    }

    /// Close the channel.
    pub fn close_channel(&mut self) -> LinkResult<()> {
        self.command(Command::CloseChannel {
            channel: self.channel,
        })
    }

    /// Reset the dongle and open the channel with `channel_id`.
    pub fn configure(&mut self, config: &ChannelConfig, channel_id: [u8; 4]) -> LinkResult<()> {
        self.channel = config.channel;
        log::info!(
            "configuring channel {} with id {:02x?}",
            self.channel,
            channel_id
        );

        self.reset()?;
        self.set_network_key(config.network, config.network_key)?;
        self.assign_channel()?;
        self.set_channel_period(config.period)?;
        self.set_channel_frequency(config.frequency)?;
        self.set_transmit_power(config.transmit_power)?;
        self.set_search_timeout(config.search_timeout)?;
        self.set_channel_id(channel_id)?;
        self.open_channel()
    }

    // ------------------------------------------------------------------
    // Acknowledged data
    // ------------------------------------------------------------------

    /// Poll transfer status events until the dongle reports completion.
    pub fn check_tx_response(&mut self) -> LinkResult<()> {
        TX_STATUS_POLL.run_or(
            |_| match self.receive_message() {
                Ok(Message::ChannelEvent { code, .. }) => match code {
                    EventCode::TransferTxCompleted => Step::Done(()),
                    EventCode::TransferTxFailed => Step::Abort(LinkError::TransmitFailed),
                    EventCode::TransferTxStart => Step::Again,
                    other => {
                        log::trace!("ignoring channel event {} while polling tx", other);
                        Step::Again
                    }
                },
                Ok(_) => Step::Again,
                Err(e) => {
                    log::trace!("tx status poll: {}", e);
                    Step::Again
                }
            },
            |exhausted| LinkError::NoAcknowledgement {
                polls: exhausted.attempts,
            },
        )
    }

    /// Send acknowledged data, resending until the dongle confirms delivery.
    ///
    /// When every attempt fails the last attempt's error is returned.
    pub fn send_acknowledged_data(&mut self, data: &[u8]) -> LinkResult<()> {
        let frame = Command::AcknowledgedData {
            channel: self.channel,
            data: data.to_vec(),
        }
        .encode()?;

        let mut last_error = None;
        let result = ACK_SEND.run(|attempt| {
            let outcome = self
                .send_frame(&frame)
                .and_then(|()| self.check_tx_response());
            match outcome {
                Ok(()) => Step::Done(()),
                Err(e) => {
                    log::debug!("acknowledged send attempt {} failed: {}", attempt + 1, e);
                    record_tx_failure(Operation::AcknowledgedSend, &e);
                    last_error = Some(e);
                    Step::Again
                }
            }
        });
        result.map_err(|e| last_error.unwrap_or(e))
    }

    /// Wait for an acknowledged data message and return its data.
    pub fn receive_acknowledged_reply(&mut self) -> LinkResult<Vec<u8>> {
        ACK_REPLY_POLL.run(|_| match self.receive_sized(ACK_REPLY_READ_SIZE) {
            Ok(frame) => match Message::decode(&frame) {
                Ok(Message::Acknowledged { data, .. }) => Step::Done(data),
                Ok(_) => Step::Again,
                Err(e) => {
                    log::debug!("acknowledged reply: {}", e);
                    Step::Again
                }
            },
            Err(e) => {
                log::debug!("acknowledged reply: {}", e);
                Step::Again
            }
        })
    }

    // ------------------------------------------------------------------
    // Burst
    // ------------------------------------------------------------------

    /// Send `data` as a burst of packets of up to nine bytes each.
    ///
    /// `inter_packet_delay` is slept after every packet. The whole burst is
    /// resent until the dongle confirms delivery; when every attempt fails the
    /// last attempt's error is returned.
    pub fn send_burst_data(&mut self, data: &[u8], inter_packet_delay: Duration) -> LinkResult<()> {
        let frames = data
            .chunks(BURST_PACKET_SIZE)
            .map(|packet| {
                Command::BurstData {
                    packet: packet.to_vec(),
                }
                .encode()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut last_error = None;
        let result = BURST_SEND.run(|attempt| {
            let outcome = self
                .send_burst_frames(&frames, inter_packet_delay)
                .and_then(|()| self.check_tx_response());
            match outcome {
                Ok(()) => Step::Done(()),
                Err(e) => {
                    log::warn!("burst attempt {} failed: {}", attempt + 1, e);
                    record_tx_failure(Operation::BurstSend, &e);
                    last_error = Some(e);
                    Step::Again
                }
            }
        });
        result.map_err(|e| last_error.unwrap_or(e))
    }

    fn send_burst_frames(&mut self, frames: &[Vec<u8>], delay: Duration) -> LinkResult<()> {
        for frame in frames {
            self.send_frame(frame)?;
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        Ok(())
    }

    /// Collect a response that arrives either as one acknowledged message or
    /// as a burst ending with the last-packet bit.
    pub fn check_burst_response(&mut self) -> LinkResult<Vec<u8>> {
        let mut response = Vec::new();
        BURST_RECEIVE_POLL.run_or(
            |_| match self.receive_message() {
                Ok(Message::ChannelEvent {
                    code: EventCode::TransferRxFailed,
                    ..
                }) => Step::Abort(LinkError::BurstFailed),
                Ok(Message::Acknowledged { data, .. }) => {
                    response.extend_from_slice(&data);
                    Step::Done(std::mem::take(&mut response))
                }
                Ok(message @ Message::Burst { .. }) => {
                    let last = message.is_last_burst_packet();
                    if let Message::Burst { data, .. } = message {
                        response.extend_from_slice(&data);
                    }
                    if last {
                        Step::Done(std::mem::take(&mut response))
                    } else {
                        Step::Again
                    }
                }
                Ok(_) => Step::Again,
                Err(e) => {
                    log::trace!("burst poll: {}", e);
                    Step::Again
                }
            },
            |exhausted| LinkError::BurstEndNotDetected {
                polls: exhausted.attempts,
            },
        )
    }

    /// Wait for a broadcast message from the tracker.
    pub fn wait_for_beacon(&mut self) -> LinkResult<()> {
        BEACON_POLL.run(|_| match self.receive_message() {
            Ok(Message::Broadcast { .. }) => Step::Done(()),
            Ok(_) => Step::Again,
            Err(e) => {
                log::trace!("beacon poll: {}", e);
                Step::Again
            }
        })
    }
}

fn record_tx_failure(operation: Operation, error: &LinkError) {
    if matches!(error, LinkError::TransmitFailed) {
        metrics::counter!(
            metric_defs::LINK_TX_FAILURES.name,
            "operation" => operation.as_str()
        )
        .increment(1);
    }
}

impl<T> std::fmt::Debug for LinkSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSession")
            .field("channel", &self.channel)
            .field("buffered", &self.codec.buffered_len())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Exhausted;
    use crate::transport::ScriptedTransport;
    use ant_protocol::{encode, MSG_ACKNOWLEDGED_DATA, MSG_BURST_DATA, MSG_CHANNEL_EVENT, MSG_STARTUP};

    fn session(transport: ScriptedTransport) -> LinkSession<ScriptedTransport> {
        LinkSession::with_timing(transport, 0, LinkTiming::immediate())
    }

    fn event(message_id: u8, code: u8) -> Vec<u8> {
        encode(MSG_CHANNEL_EVENT, &[0x00, message_id, code]).unwrap()
    }

    #[test]
    fn test_receive_frame_split_across_reads() {
        let frame = encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 1, 2, 3]).unwrap();
        let mut transport = ScriptedTransport::new();
        transport.queue(frame[..2].to_vec()).queue(frame[2..].to_vec());

        let mut link = session(transport);
        let received = link.receive_frame().unwrap();
        assert_eq!(received.as_bytes(), frame.as_slice());
        assert_eq!(link.buffered_len(), 0);
    }

    #[test]
    fn test_receive_keeps_remainder_buffered() {
        let first = encode(MSG_STARTUP, &[0x20]).unwrap();
        let second = event(0x4B, 0x00);
        let mut transport = ScriptedTransport::new();
        transport.queue([first.clone(), second.clone()].concat());

        let mut link = session(transport);
        assert_eq!(link.receive_message().unwrap(), Message::Startup { status: 0x20 });
        assert_eq!(link.buffered_len(), second.len());
        assert!(matches!(
            link.receive_message().unwrap(),
            Message::ChannelEvent { message_id: 0x4B, .. }
        ));
    }

    #[test]
    fn test_receive_starvation() {
        let mut transport = ScriptedTransport::new();
        transport.queue(Vec::new());

        let mut link = session(transport);
        let err = link.receive_frame().unwrap_err();
        assert!(matches!(err, LinkError::ReadFailed { attempts: 3 }));
        assert_eq!(link.transport().reads(), 3);
    }

    #[test]
    fn test_partial_frame_then_starvation() {
        let frame = encode(MSG_STARTUP, &[0x20]).unwrap();
        let mut transport = ScriptedTransport::new();
        transport.queue(frame[..3].to_vec());

        let mut link = session(transport);
        assert!(matches!(
            link.receive_frame(),
            Err(LinkError::ReadFailed { .. })
        ));
        assert_eq!(link.buffered_len(), 3);
    }

    #[test]
    fn test_reset_skips_unrelated_messages() {
        let mut transport = ScriptedTransport::new();
        transport
            .queue(event(0x01, 0x03))
            .queue(encode(MSG_STARTUP, &[0x01]).unwrap())
            .queue(encode(MSG_STARTUP, &[0x20]).unwrap());

        let mut link = session(transport);
        link.reset().unwrap();
        assert_eq!(link.transport().written(), &[vec![0xA4, 0x01, 0x4A, 0x00, 0xEF]]);
    }

    #[test]
    fn test_reset_exhausted() {
        let mut link = session(ScriptedTransport::new());
        let err = link.reset().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Exhausted(Exhausted {
                operation: Operation::Reset,
                attempts: 8
            })
        ));
    }

    #[test]
    fn test_reset_write_failure_is_returned() {
        let mut transport = ScriptedTransport::new();
        transport.fail_next_writes(1);

        let mut link = session(transport);
        assert!(matches!(link.reset(), Err(LinkError::Transport(_))));
    }

    #[test]
    fn test_set_command_ok_and_error() {
        let mut transport = ScriptedTransport::new();
        transport.queue(event(0x45, 0x00)).queue(event(0x47, 0x28));

        let mut link = session(transport);
        link.set_channel_frequency(0x20).unwrap();
        let err = link.set_transmit_power(0x30).unwrap_err();
        assert!(matches!(
            err,
            LinkError::ChannelResponse {
                message_id: 0x47,
                code: EventCode::Other(0x28)
            }
        ));
        assert_eq!(
            link.transport().written()[1],
            encode(0x47, &[0x00, 0x30]).unwrap()
        );
    }

    #[test]
    fn test_set_command_unexpected_message() {
        let mut transport = ScriptedTransport::new();
        transport.queue(encode(MSG_STARTUP, &[0x20]).unwrap());

        let mut link = session(transport);
        assert!(matches!(
            link.open_channel(),
            Err(LinkError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn test_configure_sequence() {
        let config = ChannelConfig::default();
        let mut transport = ScriptedTransport::new();
        transport.queue(encode(MSG_STARTUP, &[0x20]).unwrap());
        for id in [0x46, 0x42, 0x43, 0x45, 0x47, 0x44, 0x51, 0x4B] {
            transport.queue(event(id, 0x00));
        }

        let mut link = session(transport);
        link.configure(&config, config.broadcast_id).unwrap();

        let ids: Vec<u8> = link.transport().written().iter().map(|f| f[2]).collect();
        assert_eq!(ids, vec![0x4A, 0x46, 0x42, 0x43, 0x45, 0x47, 0x44, 0x51, 0x4B]);
        assert_eq!(
            link.transport().written()[7],
            encode(0x51, &[0x00, 0xFF, 0xFF, 0x01, 0x01]).unwrap()
        );
    }

    #[test]
    fn test_tx_response_outcomes() {
        let mut transport = ScriptedTransport::new();
        transport
            .queue(event(0x01, 0x0A))
            .queue(event(0x01, 0x05))
            .queue(event(0x01, 0x06));

        let mut link = session(transport);
        link.check_tx_response().unwrap();
        assert!(matches!(
            link.check_tx_response(),
            Err(LinkError::TransmitFailed)
        ));
        assert!(matches!(
            link.check_tx_response(),
            Err(LinkError::NoAcknowledgement { polls: 16 })
        ));
    }

    #[test]
    fn test_burst_send_chunks() {
        let data: Vec<u8> = (0..20).collect();
        let mut transport = ScriptedTransport::new();
        transport.queue(event(0x01, 0x05));

        let mut link = session(transport);
        link.send_burst_data(&data, Duration::ZERO).unwrap();

        let written = link.transport().written();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], encode(MSG_BURST_DATA, &data[0..9]).unwrap());
        assert_eq!(written[1], encode(MSG_BURST_DATA, &data[9..18]).unwrap());
        assert_eq!(written[2], encode(MSG_BURST_DATA, &data[18..]).unwrap());
    }

    #[test]
    fn test_check_burst_single_acknowledged() {
        let mut transport = ScriptedTransport::new();
        transport.queue(encode(MSG_ACKNOWLEDGED_DATA, &[0x00, 9, 8, 7]).unwrap());

        let mut link = session(transport);
        assert_eq!(link.check_burst_response().unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn test_check_burst_failed_event() {
        let mut transport = ScriptedTransport::new();
        transport
            .queue(encode(MSG_BURST_DATA, &[0x00, 1, 2]).unwrap())
            .queue(event(0x01, 0x04));

        let mut link = session(transport);
        assert!(matches!(
            link.check_burst_response(),
            Err(LinkError::BurstFailed)
        ));
    }

    #[test]
    fn test_wait_for_beacon() {
        let mut transport = ScriptedTransport::new();
        transport
            .queue(event(0x01, 0x03))
            .queue(encode(0x4E, &[0x00, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap());

        let mut link = session(transport);
        link.wait_for_beacon().unwrap();
    }
}
