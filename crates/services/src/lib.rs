//! Port to service-name lookup
//!
//! Names follow the IANA registry spelling used by most scanners, so a
//! report line reads `22/tcp ssh` rather than `22/tcp SSH`.

mod table;

pub use table::PortTable;
