//! Periodic sync scheduler.
//!
//! A background thread runs the job once immediately and then once per
//! interval. Stopping is observed only between jobs; a job that is running
//! finishes first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{after, select, Receiver, Sender};
use tracing::{debug, info, warn};

/// Starts the background sync thread.
#[derive(Debug)]
pub struct Scheduler;

impl Scheduler {
    /// Spawn the scheduler thread.
    ///
    /// Errors returned by `job` are logged and the scheduler waits for the
    /// next tick.
    pub fn start<F, E>(interval: Duration, mut job: F) -> std::io::Result<SchedulerHandle>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: std::fmt::Display,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let cycles = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&cycles);

        let thread = thread::Builder::new()
            .name("fitsync-scheduler".into())
            .spawn(move || {
                info!("Scheduler started, interval {:?}", interval);
                loop {
                    let cycle = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Starting sync cycle {}", cycle);
                    if let Err(e) = job() {
                        warn!("Sync cycle {} failed: {}", cycle, e);
                    }
                    if wait_for_tick(&stop_rx, interval) {
                        break;
                    }
                }
                info!("Scheduler stopped");
            })?;

        Ok(SchedulerHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            cycles,
        })
    }
}

/// Block until the next tick. Returns true when stopped instead.
fn wait_for_tick(stop_rx: &Receiver<()>, interval: Duration) -> bool {
    select! {
        recv(stop_rx) -> _ => true,
        recv(after(interval)) -> _ => false,
    }
}

/// Controls a running [`Scheduler`]. Dropping the handle stops it.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    cycles: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Stop the scheduler and wait for the thread to exit.
    ///
    /// A cycle already running completes before this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // A full channel or a finished thread both mean stop is already pending.
            let _ = stop_tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    #[test]
    fn test_runs_immediately_then_stops() {
        let (ran_tx, ran_rx) = crossbeam_channel::unbounded();
        let handle = Scheduler::start(Duration::from_secs(3600), move || {
            ran_tx.send(()).unwrap();
            Ok::<(), String>(())
        })
        .unwrap();

        ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_failed_cycle_keeps_running() {
        let (ran_tx, ran_rx) = crossbeam_channel::unbounded();
        let handle = Scheduler::start(Duration::from_millis(10), move || {
            ran_tx.send(()).unwrap();
            Err("radio unplugged")
        })
        .unwrap();

        for _ in 0..3 {
            ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(handle.cycles() >= 3);
        handle.stop();
    }

    #[test]
    fn test_stop_waits_for_running_cycle() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);

        let handle = Scheduler::start(Duration::from_secs(3600), move || {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(200));
            done.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .unwrap();

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.stop();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_stops() {
        let (ran_tx, ran_rx) = crossbeam_channel::unbounded();
        {
            let _handle = Scheduler::start(Duration::from_millis(5), move || {
                let _ = ran_tx.send(());
                Ok::<(), String>(())
            })
            .unwrap();
            ran_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        // Sender lives in the job; once the thread exits the channel closes.
        while ran_rx.recv_timeout(Duration::from_secs(5)).is_ok() {}
        assert!(ran_rx.recv_timeout(Duration::from_millis(10)).is_err());
    }
}
