//! Output formatting for scan results

use anyhow::Result;
use serde_json::{json, Value};
use std::io::Write;

use sweep_common::{render_host, HostResult, PortState, ServiceLookup};

use crate::args::OutputFormat;

/// Write results in the requested format.
///
/// The text report lists hosts that are up, plus hosts whose scan failed;
/// `show_down` adds the silent ones. JSON and CSV always carry every host.
pub fn write_results(
    out: &mut dyn Write,
    results: &[HostResult],
    format: OutputFormat,
    show_down: bool,
    services: &dyn ServiceLookup,
) -> Result<()> {
    let results: Vec<HostResult> = results.iter().map(sorted).collect();
    match format {
        OutputFormat::Text => write_text(out, &results, show_down, services),
        OutputFormat::Json => write_json(out, &results),
        OutputFormat::Csv => write_csv(out, &results),
    }
}

/// Ports in ascending order; probes complete in arbitrary order.
fn sorted(result: &HostResult) -> HostResult {
    let mut result = result.clone();
    result.open.sort_unstable();
    result.closed.sort_unstable();
    result.filtered.sort_unstable();
    result
}

fn host_state(result: &HostResult) -> &'static str {
    if result.is_failed() {
        "failed"
    } else if result.is_up() {
        "up"
    } else {
        "down"
    }
}

fn write_text(
    out: &mut dyn Write,
    results: &[HostResult],
    show_down: bool,
    services: &dyn ServiceLookup,
) -> Result<()> {
    for result in results {
        if result.is_up() || result.is_failed() || show_down {
            write!(out, "{}", render_host(result, services))?;
        }
    }
    Ok(())
}

fn write_json(out: &mut dyn Write, results: &[HostResult]) -> Result<()> {
    let hosts: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "host": r.host.to_string(),
                "state": host_state(r),
                "latency_ms": r.latency.as_secs_f64() * 1000.0,
                "open": r.open,
                "closed": r.closed,
                "filtered": r.filtered,
                "error": r.error,
            })
        })
        .collect();

    serde_json::to_writer_pretty(&mut *out, &hosts)?;
    writeln!(out)?;
    Ok(())
}

fn write_csv(out: &mut dyn Write, results: &[HostResult]) -> Result<()> {
    writeln!(out, "host,state,port")?;

    for result in results {
        let mut rows: Vec<(u16, PortState)> = result
            .open
            .iter()
            .map(|&p| (p, PortState::Open))
            .chain(result.closed.iter().map(|&p| (p, PortState::Closed)))
            .chain(result.filtered.iter().map(|&p| (p, PortState::Filtered)))
            .collect();
        rows.sort_unstable_by_key(|(port, _)| *port);

        for (port, state) in rows {
            writeln!(out, "{},{},{}", result.host, state, port)?;
        }
    }
    Ok(())
}
