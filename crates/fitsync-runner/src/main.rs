//! `fitsync` command line.

use std::path::PathBuf;
use std::process::ExitCode;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use fitsync_link::LinkSession;
use fitsync_runner::{
    open_transport, FileOpSource, Result, RunnerError, Scheduler, SyncConfig, Syncer,
    TransportConfig,
};
use fitsync_tracker::TrackerSession;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Sync an activity tracker through an ANT base station.
#[derive(Parser, Debug)]
#[command(name = "fitsync", author, version, about)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    transport: TransportArgs,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "prometheus")]
    #[arg(long, global = true)]
    metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TransportArgs {
    /// Serial device of the base station
    #[arg(long, global = true, conflicts_with = "tcp")]
    serial: Option<String>,

    /// Address of a TCP serial bridge
    #[arg(long, global = true)]
    tcp: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync cycle and exit
    Sync,

    /// Run sync cycles periodically until interrupted
    Daemon {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Pair with the tracker and run one opcode
    Opcode {
        /// Opcode bytes, base64
        opcode: String,

        /// Payload bytes, base64
        #[arg(long, default_value = "")]
        payload: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    if let Some(path) = &cli.transport.serial {
        let mut transport = TransportConfig::default();
        if let TransportConfig::Serial { path: device, .. } = &mut transport {
            *device = Some(path.clone());
        }
        config.transport = transport;
    }
    if let Some(address) = &cli.transport.tcp {
        config.transport = TransportConfig::Tcp {
            address: address.clone(),
            read_timeout_ms: 100,
        };
    }
    if let Command::Daemon {
        interval: Some(secs),
    } = cli.command
    {
        config.interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

fn source_for(config: &SyncConfig) -> FileOpSource {
    FileOpSource::new(&config.ops.queue, &config.ops.results)
}

#[cfg(feature = "prometheus")]
fn install_metrics(cli: &Cli) -> Result<()> {
    if let Some(addr) = cli.metrics_addr {
        fitsync_metrics::install_prometheus(addr)
            .map_err(|e| RunnerError::Config(format!("metrics exporter: {}", e)))?;
        info!("Serving metrics on {}", addr);
    }
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(_cli: &Cli) -> Result<()> {
    fitsync_metrics::describe_metrics();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    install_metrics(&cli)?;

    match cli.command {
        Command::Sync => {
            let source = Box::new(source_for(&config));
            let report = Syncer::new(config, source).run_once()?;
            println!(
                "synced: {} ops, {} failed",
                report.ops_run, report.ops_failed
            );
        }

        Command::Daemon { .. } => {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            ctrlc::set_handler(move || {
                let _ = stop_tx.try_send(());
            })
            .map_err(|e| RunnerError::Config(format!("signal handler: {}", e)))?;

            let interval = config.interval();
            let source = Box::new(source_for(&config));
            let mut syncer = Syncer::new(config, source);
            let handle = Scheduler::start(interval, move || syncer.run_once().map(|_| ()))?;

            let _ = stop_rx.recv();
            info!("Interrupted, finishing the current cycle");
            handle.stop();
        }

        Command::Opcode { opcode, payload } => {
            let opcode = STANDARD.decode(opcode)?;
            let payload = STANDARD.decode(payload)?;

            let transport = open_transport(&config.transport)?;
            let link = LinkSession::with_timing(transport, config.channel.channel, config.link_timing());
            let mut tracker = TrackerSession::new(link, config.tracker_options());
            let mut rng = match config.channel_seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };

            tracker.init_tracker_for_transfer(&mut rng)?;
            let response = tracker.run_opcode(&opcode, &payload)?;
            println!("{}", STANDARD.encode(response));
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
