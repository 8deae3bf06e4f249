//! Sweep Common - Shared types and traits
//!
//! This crate provides the data model, the scanner contract and the
//! report rendering used across the sweep workspace.
//!
//! Key pieces:
//! - `HostResult`: per-host aggregate of open/filtered/closed ports
//! - `ScannerConfig`: immutable settings for one scan invocation
//! - `Scanner`: the strategy contract shared by the connect and SYN scanners
//! - `render_host`: the human-readable per-host report

pub mod error;
pub mod report;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{SweepError, SweepResult};
pub use report::render_host;
pub use traits::{Scanner, ServiceLookup};
pub use types::{
    HostFailurePolicy, HostResult, PortEvent, PortState, ScanType, ScannerConfig,
};

pub use tokio_util::sync::CancellationToken;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
