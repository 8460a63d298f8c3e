//! Error types for the sync runner.

use fitsync_tracker::TrackerError;
use thiserror::Error;

/// Errors that can occur while running a sync.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// File or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid YAML for [`crate::SyncConfig`].
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An op queue or results file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The serial port could not be opened.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No CP210x base station was found.
    #[error("no base station found (looking for USB {vid:04x}:{pid:04x})")]
    NoBaseStation {
        /// USB vendor id.
        vid: u16,
        /// USB product id.
        pid: u16,
    },

    /// A base64 field could not be decoded.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Talking to the tracker failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
