//! TCP connect scanning
//!
//! Probes go through the operating system's TCP stack, so no privilege is
//! needed. Only successful handshakes and explicit refusals classify a port.

mod scanner;

pub use scanner::ConnectScanner;
