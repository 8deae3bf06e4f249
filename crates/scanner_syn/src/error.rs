use std::net::Ipv4Addr;
use sweep_common::SweepError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynError {
    #[error("raw sockets not permitted (need root/CAP_NET_RAW)")]
    NotPermitted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no route to {0}: {1}")]
    Route(Ipv4Addr, String),

    #[error("packet transport error: {0}")]
    Transport(String),

    #[error("no ARP reply from {0} before timeout")]
    ArpTimeout(Ipv4Addr),

    #[error("packet error: {0}")]
    Packet(String),

    #[error("no free ephemeral port: {0}")]
    NoEphemeralPort(String),

    #[error("non-ethernet channel for {0}")]
    UnsupportedChannel(String),
}

impl From<SynError> for SweepError {
    fn from(err: SynError) -> Self {
        match err {
            SynError::NotPermitted => SweepError::PermissionDenied(err.to_string()),
            SynError::Io(e) => SweepError::Io(e),
            SynError::ArpTimeout(_) => SweepError::Timeout(err.to_string()),
            other => SweepError::Network(other.to_string()),
        }
    }
}
