//! Sync runner for fitsync.
//!
//! Ties the tracker session to the outside world: a YAML [`SyncConfig`], the
//! serial or TCP transport to the base station, a [`RemoteOpSource`] of
//! opcodes to run, and a [`Scheduler`] that repeats the sync cycle until
//! stopped.

pub mod config;
pub mod cycle;
pub mod error;
pub mod remote_ops;
pub mod scheduler;
pub mod transport;

pub use config::{OpQueueConfig, SyncConfig, TransportConfig};
pub use cycle::{run_cycle, run_ops, CycleReport, Syncer};
pub use error::{Result, RunnerError};
pub use remote_ops::{FileOpSource, RemoteOp, RemoteOpResult, RemoteOpSource};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use transport::{open as open_transport, AnyTransport};
