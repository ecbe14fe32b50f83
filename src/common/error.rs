//! Error types for the conformance harness
//!
//! Every failure a scenario can run into is a variant here. None of them
//! aborts the suite: the runner folds them into a [`ScenarioOutcome`] and
//! moves on to the next scenario.
//!
//! [`ScenarioOutcome`]: crate::testing::ScenarioOutcome

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::testing::FailureStage;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the conformance harness
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Could not connect to server at {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    // === Protocol Errors ===
    #[error("Expected reply code {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    #[error("Server closed the connection while reply code {expected} was still expected")]
    ConnectionClosed { expected: String },

    #[error("Server timed out: no complete reply line within {0} seconds")]
    ReceiveTimeout(u64),

    // === Server Lifecycle Errors ===
    #[error("Failed to start server '{program}': {source}")]
    ServerSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot stop server: it is already {0}")]
    ServerNotRunning(String),

    #[error("Server hung on exit: still running {0} seconds after interrupt, killed")]
    StopHang(u64),

    #[error("Leak checker reported a memory leak (exit code {0})")]
    LeakDetected(i32),

    // === Output Verification Errors ===
    #[error("Mailbox directory differs from reference: {0}")]
    DirectoryMismatch(String),

    // === Script / Suite Errors ===
    #[error("Failed to read scenario script '{}': {}", .path.display(), .source)]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid suite manifest: {0}")]
    SuiteParse(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a protocol mismatch error
    pub fn protocol_mismatch(expected: &str, got: &str) -> Self {
        Self::ProtocolMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// The scenario stage this error is reported under
    pub fn stage(&self) -> FailureStage {
        match self {
            Error::ConnectFailure { .. } => FailureStage::Connect,
            Error::ProtocolMismatch { .. } | Error::ConnectionClosed { .. } => {
                FailureStage::ProtocolMismatch
            }
            Error::ReceiveTimeout(_) => FailureStage::Timeout,
            Error::StopHang(_) => FailureStage::StopHang,
            Error::LeakDetected(_) => FailureStage::LeakDetected,
            Error::DirectoryMismatch(_) => FailureStage::DirectoryMismatch,
            _ => FailureStage::Setup,
        }
    }
}
