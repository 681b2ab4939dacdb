//! Error types for the geocoding pipeline
//!
//! Variants are grouped by where a run can fail: reading input, talking to
//! the geocoding service, touching the filesystem, and parsing persisted
//! responses. Every one of them is fatal under the default failure policy.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, GeobatchError>;

#[derive(Error, Debug)]
pub enum GeobatchError {
    /// Input file could not be opened or read as CSV
    #[error("Failed to read address input '{}': {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row was readable but does not describe an address
    #[error("Malformed address row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    /// The request never produced a response
    #[error("Geocoding request for batch {batch} failed: {source}")]
    Transport {
        batch: usize,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status
    #[error("Geocoding service rejected batch {batch} with HTTP {status}")]
    OracleStatus {
        batch: usize,
        status: reqwest::StatusCode,
        /// Response body as received, kept for diagnosis
        body: Vec<u8>,
    },

    #[error("Failed to encode batch {batch} for the geocoding service: {source}")]
    Encode {
        batch: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write artifact '{}': {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan artifact directory '{}': {source}", path.display())]
    ArtifactScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted response does not match the expected response schema
    #[error("Artifact '{}' is not a valid geocoding response: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write aggregated output '{}': {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("A background task stopped unexpectedly: {0}")]
    TaskPanicked(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] geobatch_common::CommonError),
}

impl GeobatchError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed row error
    pub fn malformed_row(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            line,
            reason: reason.into(),
        }
    }

    /// Whether the error came from the geocoding service rather than local I/O
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::OracleStatus { .. })
    }
}
