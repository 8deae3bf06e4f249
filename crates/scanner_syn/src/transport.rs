//! Packet transport: raw frame injection and capture on one interface

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use std::io;
use std::time::{Duration, Instant};
use tracing::trace;

use sweep_common::CancellationToken;

use crate::error::SynError;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
/// Pause after a failed read; a broken handle fails without blocking.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(5);

pub trait FrameSender: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), SynError>;
}

pub trait FrameReceiver: Send {
    /// Next captured frame. Returns `TimedOut`/`WouldBlock` when nothing
    /// arrived within the handle's read timeout.
    fn next_frame(&mut self) -> io::Result<&[u8]>;
}

/// Opens capture/injection handles for an interface.
pub trait PacketTransport: Send + Sync {
    /// Fails when the process may not open raw handles.
    fn check_access(&self) -> Result<(), SynError>;

    fn open(
        &self,
        interface: &NetworkInterface,
    ) -> Result<(Box<dyn FrameSender>, Box<dyn FrameReceiver>), SynError>;
}

/// pnet datalink channels.
#[derive(Debug, Clone)]
pub struct DatalinkTransport {
    read_timeout: Duration,
}

impl Default for DatalinkTransport {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
        }
    }
}

impl DatalinkTransport {
    fn config(&self) -> Config {
        Config {
            read_timeout: Some(self.read_timeout),
            ..Default::default()
        }
    }
}

impl PacketTransport for DatalinkTransport {
    fn check_access(&self) -> Result<(), SynError> {
        if raw_socket_permitted() {
            Ok(())
        } else {
            Err(SynError::NotPermitted)
        }
    }

    fn open(
        &self,
        interface: &NetworkInterface,
    ) -> Result<(Box<dyn FrameSender>, Box<dyn FrameReceiver>), SynError> {
        open_ethernet(interface, self.config(), datalink::channel)
    }
}

fn open_ethernet<F>(
    interface: &NetworkInterface,
    config: Config,
    opener: F,
) -> Result<(Box<dyn FrameSender>, Box<dyn FrameReceiver>), SynError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let channel = opener(interface, config).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => SynError::NotPermitted,
        _ => SynError::Transport(format!("opening on {}: {e}", interface.name)),
    })?;
    match channel {
        Channel::Ethernet(tx, rx) => Ok((
            Box::new(EthernetSender(tx)),
            Box::new(EthernetReceiver(rx)),
        )),
        _ => Err(SynError::UnsupportedChannel(interface.name.clone())),
    }
}

struct EthernetSender(Box<dyn DataLinkSender>);

impl FrameSender for EthernetSender {
    fn send(&mut self, frame: &[u8]) -> Result<(), SynError> {
        match self.0.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(SynError::Io(e)),
            None => Err(SynError::Transport("no room in send buffer".into())),
        }
    }
}

struct EthernetReceiver(Box<dyn DataLinkReceiver>);

impl FrameReceiver for EthernetReceiver {
    fn next_frame(&mut self) -> io::Result<&[u8]> {
        self.0.next()
    }
}

/// Whether a raw IPv4 socket can be opened.
#[cfg(target_os = "linux")]
fn raw_socket_permitted() -> bool {
    // SAFETY: plain socket(2); the descriptor is closed right away.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_TCP) };
    if fd < 0 {
        return false;
    }
    unsafe {
        libc::close(fd);
    }
    true
}

#[cfg(all(unix, not(target_os = "linux")))]
fn raw_socket_permitted() -> bool {
    // BPF devices need root on the BSDs and macOS.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn raw_socket_permitted() -> bool {
    false
}

/// Lazy sequence of captured frames.
///
/// Ends at the deadline or once the close token fires, whichever comes
/// first. Read timeouts and read errors do not end it.
pub struct Frames<'a> {
    rx: &'a mut dyn FrameReceiver,
    deadline: Option<Instant>,
    close: Option<CancellationToken>,
}

impl<'a> Frames<'a> {
    pub fn until(rx: &'a mut dyn FrameReceiver, deadline: Instant) -> Self {
        Self {
            rx,
            deadline: Some(deadline),
            close: None,
        }
    }

    pub fn until_closed(rx: &'a mut dyn FrameReceiver, close: CancellationToken) -> Self {
        Self {
            rx,
            deadline: None,
            close: Some(close),
        }
    }

    fn finished(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.close.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while !self.finished() {
            match self.rx.next_frame() {
                Ok(frame) => return Some(frame.to_vec()),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
                Err(e) => {
                    trace!(error = %e, "frame read failed");
                    std::thread::sleep(READ_ERROR_BACKOFF);
                }
            }
        }
        None
    }
}
