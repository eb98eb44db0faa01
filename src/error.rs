//! Error types for cyberscan.
//!
//! Uses `thiserror` for ergonomic error definitions.

use crate::types::{PortError, TargetError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scanning operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The target string is neither an IPv4 literal nor a hostname.
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    /// The port specification resolved to no usable ports.
    #[error("invalid port specification: {0}")]
    InvalidPortSpec(#[from] PortError),

    /// A single probe could not be carried out. Recorded per port, never fatal.
    #[error("probe of port {port} failed: {reason}")]
    Probe { port: u16, reason: String },

    /// The OS fingerprinting tool is missing or returned an error.
    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),
}

impl ScanError {
    pub(crate) fn probe(port: u16, reason: impl Into<String>) -> Self {
        Self::Probe {
            port,
            reason: reason.into(),
        }
    }
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors raised while loading or saving settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {}: {reason}", path.display())]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings file: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level error for the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type CliResult<T> = Result<T, CliError>;
