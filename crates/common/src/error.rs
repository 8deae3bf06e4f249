//! Error types for the sweep scanner
//!
//! Only scan-wide and precondition failures surface through these; per-port
//! outcomes always travel through `HostResult`.

use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scanner not started: call start() before scan()")]
    NotStarted,

    #[error("Scan of {host} failed: {reason}")]
    HostFailed { host: Ipv4Addr, reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for sweep operations
pub type SweepResult<T> = Result<T, SweepError>;
