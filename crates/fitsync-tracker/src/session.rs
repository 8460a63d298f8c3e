//! The tracker device session.

use std::time::Duration;

use fitsync_link::retry::{Operation, Retry, Step};
use fitsync_link::{ChannelConfig, LinkSession, Transport};
use fitsync_metrics::{metric_defs, metrics};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::payload::{TrackerPayload, MAX_PAYLOAD_LEN};
use crate::reply::{data_bank_page, DataBankPage, ReplyKind, TrackerReply};

/// First packet id; ids rotate through eight values from here.
pub const PACKET_ID_BASE: u8 = 0x38;
const PACKET_ID_COUNT: u8 = 8;

/// Attempts per opcode.
pub const RUN_OPCODE: Retry = Retry::new(Operation::RunOpcode, 4);
/// Page requests per data bank.
pub const DATA_BANK_REQUESTS: Retry = Retry::new(Operation::DataBank, 2000);

/// Data bank command for the first page.
pub const DATA_BANK_START: u8 = 0x70;
/// Data bank command for every later page.
pub const DATA_BANK_CONTINUE: u8 = 0x60;

const RESET_TRACKER: [u8; 8] = [0x78, 0x01, 0, 0, 0, 0, 0, 0];
const PING_TRACKER: [u8; 8] = [0x78, 0x00, 0, 0, 0, 0, 0, 0];
const COMMAND_SLEEP: [u8; 8] = [0x7F, 0x03, 0, 0, 0, 0, 0, 0x3C];

/// What to do when a reply echoes a packet id other than the one just sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketIdPolicy {
    /// Log it and spend the attempt.
    #[default]
    Retry,
    /// Log it and act on the reply anyway.
    Ignore,
}

/// Settings for a tracker session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Channel parameters used whenever the link is (re)configured.
    pub channel: ChannelConfig,
    /// Packet id mismatch handling.
    pub packet_id_policy: PacketIdPolicy,
    /// Sleep between burst packets while uploading.
    pub burst_delay: Duration,
}

/// A session with one tracker over an ANT link.
#[derive(Debug)]
pub struct TrackerSession<T> {
    link: LinkSession<T>,
    options: TrackerOptions,
    packet_count: u8,
    current_packet_id: u8,
    current_bank_id: u8,
}

impl<T: Transport> TrackerSession<T> {
    /// Wrap a link session.
    pub fn new(link: LinkSession<T>, options: TrackerOptions) -> Self {
        TrackerSession {
            link,
            options,
            packet_count: 0,
            current_packet_id: PACKET_ID_BASE,
            current_bank_id: 0,
        }
    }

    /// The underlying link.
    pub fn link(&self) -> &LinkSession<T> {
        &self.link
    }

    /// The underlying link, mutably.
    pub fn link_mut(&mut self) -> &mut LinkSession<T> {
        &mut self.link
    }

    /// Consume the session, returning the link.
    pub fn into_link(self) -> LinkSession<T> {
        self.link
    }

    /// Id of the most recent tracker packet.
    pub fn current_packet_id(&self) -> u8 {
        self.current_packet_id
    }

    /// Packet ids taken since the last wrap, `0..=7`.
    pub fn packet_count(&self) -> u8 {
        self.packet_count
    }

    /// Next data bank page to request. Wraps after 255 like the request byte.
    pub fn current_bank_id(&self) -> u8 {
        self.current_bank_id
    }

    /// Take the next packet id.
    pub fn gen_packet_id(&mut self) -> u8 {
        self.current_packet_id = PACKET_ID_BASE + self.packet_count;
        self.packet_count = (self.packet_count + 1) % PACKET_ID_COUNT;
        self.current_packet_id
    }

    /// Send `opcode` behind a fresh packet id as acknowledged data.
    pub fn send_tracker_packet(&mut self, opcode: &[u8]) -> TrackerResult<()> {
        let mut packet = Vec::with_capacity(opcode.len() + 1);
        packet.push(self.gen_packet_id());
        packet.extend_from_slice(opcode);
        trace!("TrackerSession: sending packet {:02x?}", packet);
        self.link.send_acknowledged_data(&packet)?;
        Ok(())
    }

    /// Run an opcode and return the tracker's response.
    ///
    /// Depending on the reply the response is read immediately, paged out of
    /// the data bank, or read after uploading `payload`.
    pub fn run_opcode(&mut self, opcode: &[u8], payload: &[u8]) -> TrackerResult<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(TrackerError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        debug!("TrackerSession: running opcode {:02x?}", opcode);
        RUN_OPCODE.run_or(
            |attempt| {
                metrics::counter!(metric_defs::TRACKER_OPCODE_ATTEMPTS.name).increment(1);
                self.opcode_attempt(attempt, opcode, payload)
            },
            |exhausted| TrackerError::OpcodeFailed {
                attempts: exhausted.attempts,
            },
        )
    }

    fn opcode_attempt(
        &mut self,
        attempt: usize,
        opcode: &[u8],
        payload: &[u8],
    ) -> Step<Vec<u8>, TrackerError> {
        if let Err(e) = self.send_tracker_packet(opcode) {
            warn!("TrackerSession: opcode attempt {} send failed: {}", attempt + 1, e);
            return Step::Again;
        }
        let reply = match self.link.receive_acknowledged_reply() {
            Ok(data) => data,
            Err(e) => {
                warn!("TrackerSession: opcode attempt {} got no reply: {}", attempt + 1, e);
                return Step::Again;
            }
        };
        let Some(reply) = TrackerReply::parse(reply) else {
            warn!("TrackerSession: opcode reply too short");
            return Step::Again;
        };

        if reply.packet_id != self.current_packet_id {
            warn!(
                "TrackerSession: packet ids don't match, sent 0x{:02x} got 0x{:02x}",
                self.current_packet_id, reply.packet_id
            );
            if self.options.packet_id_policy == PacketIdPolicy::Retry {
                return Step::Again;
            }
        }

        match reply.kind {
            ReplyKind::Immediate => Step::Done(reply.into_body()),
            ReplyKind::EnterDataBank => match self.get_data_bank() {
                Ok(bank) => Step::Done(bank),
                Err(e) => Step::Abort(e),
            },
            ReplyKind::ReadyForPayload if payload.is_empty() => {
                warn!("TrackerSession: tracker wants a payload but none was given");
                Step::Again
            }
            ReplyKind::ReadyForPayload => {
                if let Err(e) = self.send_tracker_payload(payload) {
                    warn!("TrackerSession: payload upload failed: {}", e);
                    return Step::Again;
                }
                match self.link.receive_acknowledged_reply() {
                    Ok(mut data) => {
                        if !data.is_empty() {
                            data.remove(0);
                        }
                        Step::Done(data)
                    }
                    Err(e) => {
                        warn!("TrackerSession: no reply after payload: {}", e);
                        Step::Again
                    }
                }
            }
            ReplyKind::Unrecognized(code) => {
                warn!("TrackerSession: unrecognized reply code 0x{:02x}", code);
                Step::Again
            }
        }
    }

    /// Upload a payload as one burst.
    pub fn send_tracker_payload(&mut self, payload: &[u8]) -> TrackerResult<()> {
        let packet_id = self.gen_packet_id();
        let burst = TrackerPayload {
            packet_id,
            channel: self.link.channel(),
            data: payload,
        }
        .encode()?;
        debug!(
            "TrackerSession: uploading {} byte payload in {} packets",
            payload.len(),
            burst.len() / ant_protocol::BURST_PACKET_SIZE
        );
        self.link.send_burst_data(&burst, self.options.burst_delay)?;
        Ok(())
    }

    /// Page through the data bank until the tracker sends an empty page.
    pub fn get_data_bank(&mut self) -> TrackerResult<Vec<u8>> {
        let mut bank = Vec::new();
        let mut command = DATA_BANK_START;

        let result = DATA_BANK_REQUESTS.run_or(
            |_| {
                let page = match self.data_bank_page(command) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(
                            "TrackerSession: data bank page {} failed: {}",
                            self.current_bank_id, e
                        );
                        return Step::Again;
                    }
                };
                let body = match data_bank_page(&page) {
                    DataBankPage::NotTrackerBurst(marker) => {
                        warn!(
                            "TrackerSession: data bank page {} is not a tracker burst, marker {:02x?}",
                            self.current_bank_id, marker
                        );
                        return Step::Again;
                    }
                    DataBankPage::End => None,
                    DataBankPage::Page(body) => Some(body),
                };

                command = DATA_BANK_CONTINUE;
                self.advance_bank_id();
                match body {
                    Some(body) => {
                        metrics::counter!(metric_defs::TRACKER_DATA_BANK_PAGES.name).increment(1);
                        bank.extend_from_slice(body);
                        Step::Again
                    }
                    None => Step::Done(()),
                }
            },
            |exhausted| TrackerError::DataBankIncomplete {
                requests: exhausted.attempts,
            },
        );
        result?;

        metrics::histogram!(metric_defs::TRACKER_DATA_BANK_BYTES.name).record(bank.len() as f64);
        debug!("TrackerSession: data bank complete, {} bytes", bank.len());
        Ok(bank)
    }

    fn advance_bank_id(&mut self) {
        self.current_bank_id = self.current_bank_id.wrapping_add(1);
        if self.current_bank_id == 0 {
            warn!("TrackerSession: data bank page id wrapped to 0");
        }
    }

    fn data_bank_page(&mut self, command: u8) -> TrackerResult<Vec<u8>> {
        let bank_id = self.current_bank_id;
        self.send_tracker_packet(&[command, 0x00, 0x02, bank_id, 0x00, 0x00, 0x00])?;
        Ok(self.link.check_burst_response()?)
    }

    /// Tell the tracker to reset.
    pub fn reset_tracker(&mut self) -> TrackerResult<()> {
        self.link.send_acknowledged_data(&RESET_TRACKER)?;
        Ok(())
    }

    /// Check the tracker answers on the current channel.
    pub fn ping_tracker(&mut self) -> TrackerResult<()> {
        self.link.send_acknowledged_data(&PING_TRACKER)?;
        Ok(())
    }

    /// Tell the tracker to hop to the two-byte channel id `cid`.
    pub fn switch_channel(&mut self, cid: [u8; 2]) -> TrackerResult<()> {
        self.link
            .send_acknowledged_data(&[0x78, 0x02, cid[0], cid[1], 0, 0, 0, 0])?;
        Ok(())
    }

    /// Put the tracker to sleep.
    pub fn command_sleep(&mut self) -> TrackerResult<()> {
        self.link.send_acknowledged_data(&COMMAND_SLEEP)?;
        Ok(())
    }

    /// Find the tracker on the broadcast channel and move it to a private one.
    ///
    /// Returns the private channel id. Any failed step aborts the whole flow.
    pub fn init_tracker_for_transfer<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> TrackerResult<[u8; 4]> {
        let config = self.options.channel.clone();

        self.link.configure(&config, config.broadcast_id)?;
        self.link.wait_for_beacon()?;
        self.reset_tracker()?;

        let cid = [rng.gen_range(0..=254u8), rng.gen_range(0..=254u8)];
        self.switch_channel(cid)?;
        self.link.close_channel()?;

        let channel_id = [cid[0], cid[1], 0x01, 0x01];
        self.link.configure(&config, channel_id)?;
        self.link.wait_for_beacon()?;
        self.ping_tracker()?;

        info!("TrackerSession: tracker moved to channel id {:02x?}", channel_id);
        Ok(channel_id)
    }
}
