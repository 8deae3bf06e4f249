//! Human-readable per-host report

use std::fmt::Write;

use crate::traits::ServiceLookup;
use crate::types::HostResult;

/// Render one host's result in the classic report layout.
///
/// ```text
/// Scan results for 10.0.0.1
///     Host is up, with a latency of 1.2ms. Open ports:
///     22/tcp  ssh
/// ```
pub fn render_host(result: &HostResult, services: &dyn ServiceLookup) -> String {
    let mut out = format!("Scan results for {}\n", result.host);

    if let Some(reason) = &result.error {
        let _ = writeln!(out, "\tHost scan failed: {}", reason);
        return out;
    }

    if !result.is_up() {
        out.push_str("\tHost is down\n");
        return out;
    }

    let _ = writeln!(
        out,
        "\tHost is up, with a latency of {:?}. Open ports:",
        result.latency
    );
    for port in &result.open {
        let service = services.service_name(*port).unwrap_or("unknown");
        let _ = writeln!(out, "\t{}/tcp\t{}", port, service);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    struct Table;

    impl ServiceLookup for Table {
        fn service_name(&self, port: u16) -> Option<&str> {
            match port {
                22 => Some("ssh"),
                80 => Some("http"),
                _ => None,
            }
        }
    }

    #[test]
    fn down_host() {
        let r = HostResult::new(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(
            render_host(&r, &Table),
            "Scan results for 10.0.0.1\n\tHost is down\n"
        );
    }

    #[test]
    fn up_host_lists_open_ports_with_services() {
        let mut r = HostResult::new(Ipv4Addr::new(10, 0, 0, 2));
        r.latency = Duration::from_millis(3);
        r.open = vec![22, 80, 31337];
        r.closed = vec![443];

        let text = render_host(&r, &Table);
        assert_eq!(
            text,
            "Scan results for 10.0.0.2\n\
             \tHost is up, with a latency of 3ms. Open ports:\n\
             \t22/tcp\tssh\n\
             \t80/tcp\thttp\n\
             \t31337/tcp\tunknown\n"
        );
    }

    #[test]
    fn failed_host_shows_reason() {
        let r = HostResult::failed(Ipv4Addr::new(10, 0, 0, 3), "ARP timeout");
        assert!(render_host(&r, &Table).contains("\tHost scan failed: ARP timeout\n"));
    }
}
