//! Remote ops: opcodes queued for the tracker and the responses it gave.
//!
//! Ops and results are exchanged as JSON with base64 byte fields:
//!
//! ```json
//! [{ "opCode": "JAAAAAAAAA==", "payloadData": "" }]
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// One opcode to run on the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOp {
    /// Opcode bytes.
    #[serde(with = "base64_bytes")]
    pub op_code: Vec<u8>,
    /// Payload uploaded if the tracker asks for one.
    #[serde(with = "base64_bytes", default)]
    pub payload_data: Vec<u8>,
}

/// The outcome of one [`RemoteOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOpResult {
    /// Opcode that was run.
    #[serde(with = "base64_bytes")]
    pub op_code: Vec<u8>,
    /// Tracker response on success.
    #[serde(with = "base64_opt", default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Vec<u8>>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the op finished.
    pub completed_at: DateTime<Utc>,
}

impl RemoteOpResult {
    /// Build a result from the outcome of running `op`.
    pub fn from_outcome<E: std::fmt::Display>(
        op: &RemoteOp,
        outcome: std::result::Result<Vec<u8>, E>,
    ) -> Self {
        let (response, error) = match outcome {
            Ok(response) => (Some(response), None),
            Err(e) => (None, Some(e.to_string())),
        };
        RemoteOpResult {
            op_code: op.op_code.clone(),
            response,
            error,
            completed_at: Utc::now(),
        }
    }

    /// True when the op produced a response.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Where remote ops come from and where results go.
pub trait RemoteOpSource {
    /// Take the pending ops.
    fn fetch(&mut self) -> Result<Vec<RemoteOp>>;

    /// Hand back the results of a cycle.
    fn report(&mut self, results: Vec<RemoteOpResult>) -> Result<()>;
}

/// Remote ops kept in JSON files.
///
/// `fetch` consumes the queue file; `report` appends to the results file.
/// A missing queue file means no pending ops.
#[derive(Debug, Clone)]
pub struct FileOpSource {
    queue: PathBuf,
    results: PathBuf,
}

impl FileOpSource {
    /// Create a source over the given queue and results files.
    pub fn new(queue: impl Into<PathBuf>, results: impl Into<PathBuf>) -> Self {
        FileOpSource {
            queue: queue.into(),
            results: results.into(),
        }
    }

    fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
        match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => Ok(T::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl RemoteOpSource for FileOpSource {
    fn fetch(&mut self) -> Result<Vec<RemoteOp>> {
        let ops: Vec<RemoteOp> = Self::read_json(&self.queue)?;
        if !ops.is_empty() {
            fs::remove_file(&self.queue)?;
        }
        debug!("Fetched {} remote ops from {}", ops.len(), self.queue.display());
        Ok(ops)
    }

    fn report(&mut self, results: Vec<RemoteOpResult>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let mut all: Vec<RemoteOpResult> = Self::read_json(&self.results)?;
        all.extend(results);
        fs::write(&self.results, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
