//! Runner configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no file)
//! is a valid configuration that syncs over the first CP210x base station
//! found every ten minutes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fitsync_link::{ChannelConfig, LinkTiming};
use fitsync_tracker::{PacketIdPolicy, TrackerOptions};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// How to reach the base station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// A serial device node.
    Serial {
        /// Device path. When absent the base station is found by USB id.
        #[serde(default)]
        path: Option<String>,
        /// Baud rate.
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Read timeout in milliseconds.
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
    /// A TCP serial bridge.
    Tcp {
        /// `host:port` of the bridge.
        address: String,
        /// Read timeout in milliseconds.
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout_ms() -> u64 {
    100
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            path: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Where remote ops come from and where their results go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpQueueConfig {
    /// JSON file of pending ops; consumed on each cycle.
    pub queue: PathBuf,
    /// JSON file results are appended to.
    pub results: PathBuf,
}

impl Default for OpQueueConfig {
    fn default() -> Self {
        OpQueueConfig {
            queue: PathBuf::from("remote_ops.json"),
            results: PathBuf::from("remote_results.json"),
        }
    }
}

/// Top-level runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base station transport.
    pub transport: TransportConfig,
    /// ANT channel parameters.
    pub channel: ChannelConfig,
    /// Seconds between sync cycles in daemon mode.
    pub interval_secs: u64,
    /// Remote op queue files.
    pub ops: OpQueueConfig,
    /// Packet id mismatch handling.
    pub packet_id_policy: PacketIdPolicy,
    /// Pause after a dongle reset, in milliseconds.
    pub reset_settle_ms: u64,
    /// Pause between burst packets, in milliseconds.
    pub burst_delay_ms: u64,
    /// Seed for the private channel id; random when absent.
    pub channel_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            transport: TransportConfig::default(),
            channel: ChannelConfig::default(),
            interval_secs: 600,
            ops: OpQueueConfig::default(),
            packet_id_policy: PacketIdPolicy::default(),
            reset_settle_ms: 1000,
            burst_delay_ms: 1,
            channel_seed: None,
        }
    }
}

impl SyncConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SyncConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(RunnerError::Config("interval_secs must be positive".into()));
        }
        if let TransportConfig::Tcp { address, .. } = &self.transport {
            if address.is_empty() {
                return Err(RunnerError::Config("tcp transport needs an address".into()));
            }
        }
        Ok(())
    }

    /// Interval between daemon cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Link timing derived from this config.
    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            reset_settle: Duration::from_millis(self.reset_settle_ms),
        }
    }

    /// Tracker session options derived from this config.
    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            channel: self.channel.clone(),
            packet_id_policy: self.packet_id_policy,
            burst_delay: Duration::from_millis(self.burst_delay_ms),
        }
    }
}
