//! Bounded retry policies.
//!
//! Every polling and resend loop in the link and tracker sessions runs through
//! [`Retry::run`]. Each ceiling is a separate named constant because they track
//! different real timing budgets and are not interchangeable.

use fitsync_metrics::{metric_defs, metrics};
use thiserror::Error;

/// Operations that poll or resend under a bounded budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Waiting for the startup message after a reset.
    Reset,
    /// Resending an acknowledged data packet.
    AcknowledgedSend,
    /// Polling for a transfer status event.
    TransmitStatus,
    /// Waiting for an acknowledged reply.
    AcknowledgedReply,
    /// Resending a whole burst.
    BurstSend,
    /// Collecting burst packets.
    BurstReceive,
    /// Waiting for the tracker beacon.
    Beacon,
    /// Running a tracker opcode.
    RunOpcode,
    /// Paging through a data bank.
    DataBank,
}

impl Operation {
    /// Returns the operation as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Reset => "reset",
            Operation::AcknowledgedSend => "acknowledged_send",
            Operation::TransmitStatus => "transmit_status",
            Operation::AcknowledgedReply => "acknowledged_reply",
            Operation::BurstSend => "burst_send",
            Operation::BurstReceive => "burst_receive",
            Operation::Beacon => "beacon",
            Operation::RunOpcode => "run_opcode",
            Operation::DataBank => "data_bank",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retry loop ran out of attempts.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{operation} gave up after {attempts} attempts")]
pub struct Exhausted {
    /// The operation that gave up.
    pub operation: Operation,
    /// Attempts made.
    pub attempts: usize,
}

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Step<T, E> {
    /// Finished with a value.
    Done(T),
    /// Finished with an error; no further attempts.
    Abort(E),
    /// Try again if budget remains.
    Again,
}

/// A named attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    /// Operation being retried.
    pub operation: Operation,
    /// Maximum attempts.
    pub limit: usize,
}

impl Retry {
    /// Create a policy.
    pub const fn new(operation: Operation, limit: usize) -> Self {
        Retry { operation, limit }
    }

    /// Run `attempt` until it finishes or the budget is spent.
    ///
    /// The closure receives the zero-based attempt index.
    pub fn run<T, E>(&self, attempt: impl FnMut(usize) -> Step<T, E>) -> Result<T, E>
    where
        E: From<Exhausted>,
    {
        self.run_or(attempt, E::from)
    }

    /// Like [`Retry::run`], mapping exhaustion through `exhausted`.
    pub fn run_or<T, E>(
        &self,
        mut attempt: impl FnMut(usize) -> Step<T, E>,
        exhausted: impl FnOnce(Exhausted) -> E,
    ) -> Result<T, E> {
        for index in 0..self.limit {
            match attempt(index) {
                Step::Done(value) => return Ok(value),
                Step::Abort(err) => return Err(err),
                Step::Again => {}
            }
        }

        log::warn!("{} gave up after {} attempts", self.operation, self.limit);
        metrics::counter!(
            metric_defs::LINK_RETRIES_EXHAUSTED.name,
            "operation" => self.operation.as_str()
        )
        .increment(1);
        Err(exhausted(Exhausted {
            operation: self.operation,
            attempts: self.limit,
        }))
    }
}

/// Consecutive failed or empty transport reads before a receive gives up.
pub const READ_ATTEMPTS: usize = 3;
/// Polls for the startup message after a reset.
pub const RESET_POLL: Retry = Retry::new(Operation::Reset, 8);
/// Sends of one acknowledged data packet.
pub const ACK_SEND: Retry = Retry::new(Operation::AcknowledgedSend, 8);
/// Status polls after each acknowledged or burst send.
pub const TX_STATUS_POLL: Retry = Retry::new(Operation::TransmitStatus, 16);
/// Polls for an acknowledged reply.
pub const ACK_REPLY_POLL: Retry = Retry::new(Operation::AcknowledgedReply, 30);
/// Sends of a whole burst.
pub const BURST_SEND: Retry = Retry::new(Operation::BurstSend, 4);
/// Polls while collecting a burst response.
pub const BURST_RECEIVE_POLL: Retry = Retry::new(Operation::BurstReceive, 128);
/// Polls for the tracker beacon.
pub const BEACON_POLL: Retry = Retry::new(Operation::Beacon, 75);
