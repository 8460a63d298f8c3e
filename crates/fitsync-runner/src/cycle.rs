//! One sync cycle: pair with the tracker, run the queued ops, let it sleep.

use std::time::Instant;

use fitsync_link::{LinkSession, Transport};
use fitsync_metrics::metric_defs;
use fitsync_tracker::TrackerSession;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::remote_ops::{RemoteOp, RemoteOpResult, RemoteOpSource};
use crate::transport;

/// Summary of a finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Private channel id the tracker was moved to.
    pub channel_id: [u8; 4],
    /// Ops run.
    pub ops_run: usize,
    /// Ops that ended in an error.
    pub ops_failed: usize,
}

/// Pair with the tracker and run `ops`, returning one result per op.
///
/// Pairing failures abort the cycle. A failed op is recorded in its result
/// and the remaining ops still run.
pub fn run_ops<T: Transport, R: Rng + ?Sized>(
    tracker: &mut TrackerSession<T>,
    ops: &[RemoteOp],
    rng: &mut R,
) -> Result<([u8; 4], Vec<RemoteOpResult>)> {
    let channel_id = tracker.init_tracker_for_transfer(rng)?;

    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        let outcome = tracker.run_opcode(&op.op_code, &op.payload_data);
        if let Err(e) = &outcome {
            warn!("Remote op {:02x?} failed: {}", op.op_code, e);
        }
        results.push(RemoteOpResult::from_outcome(op, outcome));
    }

    if let Err(e) = tracker.command_sleep() {
        warn!("Tracker did not take the sleep command: {}", e);
    }
    if let Err(e) = tracker.link_mut().close_channel() {
        warn!("Closing the channel failed: {}", e);
    }

    Ok((channel_id, results))
}

/// Run one cycle over `transport`, reporting results to `source`.
pub fn run_cycle<T: Transport, R: Rng + ?Sized>(
    config: &SyncConfig,
    transport: T,
    source: &mut dyn RemoteOpSource,
    rng: &mut R,
) -> Result<CycleReport> {
    let ops = source.fetch()?;
    metrics::gauge!(metric_defs::SYNC_OPS_QUEUED.name).set(ops.len() as f64);
    let link = LinkSession::with_timing(transport, config.channel.channel, config.link_timing());
    let mut tracker = TrackerSession::new(link, config.tracker_options());

    let (channel_id, results) = match run_ops(&mut tracker, &ops, rng) {
        Ok(outcome) => outcome,
        Err(e) => {
            // Ops that never ran go back to the source as failures.
            let failed = ops
                .iter()
                .map(|op| RemoteOpResult::from_outcome::<String>(op, Err(format!("sync failed: {}", e))))
                .collect();
            source.report(failed)?;
            return Err(e);
        }
    };

    let report = CycleReport {
        channel_id,
        ops_run: results.len(),
        ops_failed: results.iter().filter(|r| !r.is_ok()).count(),
    };
    source.report(results)?;
    Ok(report)
}

/// Opens the configured transport and runs cycles against it.
pub struct Syncer {
    config: SyncConfig,
    source: Box<dyn RemoteOpSource + Send>,
    rng: ChaCha8Rng,
}

impl Syncer {
    /// Create a syncer.
    pub fn new(config: SyncConfig, source: Box<dyn RemoteOpSource + Send>) -> Self {
        let rng = match config.channel_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Syncer { config, source, rng }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Open the transport and run one cycle, recording metrics.
    pub fn run_once(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let outcome = transport::open(&self.config.transport).and_then(|transport| {
            run_cycle(&self.config, transport, self.source.as_mut(), &mut self.rng)
        });

        let result = if outcome.is_ok() { "ok" } else { "failed" };
        metrics::counter!(metric_defs::SYNC_CYCLES.name, "result" => result).increment(1);
        metrics::histogram!(metric_defs::SYNC_CYCLE_TIME.name)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        if let Ok(report) = &outcome {
            info!(
                "Sync cycle done: channel {:02x?}, {} ops, {} failed",
                report.channel_id, report.ops_run, report.ops_failed
            );
        }
        outcome
    }
}

impl std::fmt::Debug for Syncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer").field("config", &self.config).finish_non_exhaustive()
    }
}
