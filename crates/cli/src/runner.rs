use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use sweep_common::{
    CancellationToken, HostFailurePolicy, HostResult, ScanType, Scanner, ScannerConfig,
};
use sweep_scanner_syn::{SynError, SynScanner};
use sweep_scanner_tcp::ConnectScanner;
use sweep_services::PortTable;
use sweep_target_resolver::TargetResolver;

use crate::args::{Preset, ScanArgs};
use crate::output::write_results;

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let config = build_config(&args)?;
    let ports = parse_ports(&args.ports)?;
    let targets = TargetResolver::from_env().resolve(&args.targets).await?;

    info!(
        targets = targets.len(),
        ports = ports.len(),
        scan_type = %config.scan_type,
        concurrency = config.concurrency,
        timeout = ?config.timeout,
        "Starting scan..."
    );

    let scanner = build_scanner(targets, config)?;
    scanner.start();

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let started = Instant::now();
    let outcome = scanner.scan(cancel, &ports).await;
    interrupt.abort();
    scanner.shutdown().await;
    let results = outcome.context("Scan failed")?;
    let elapsed = started.elapsed();

    info!("Scan finished in {:?}", elapsed);
    log_summary(&results, elapsed);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_results(&mut out, &results, args.output, args.show_down, &PortTable::new())?;
    out.flush()?;
    Ok(())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Canceling scan...");
        cancel.cancel();
    }
}

fn build_config(args: &ScanArgs) -> Result<ScannerConfig> {
    let mut config = match args.preset {
        Preset::Fast => ScannerConfig::fast(),
        Preset::Balanced => ScannerConfig::default(),
        Preset::Thorough => ScannerConfig::thorough(),
        Preset::Stealth => ScannerConfig::stealth(),
    };

    let scan_type: ScanType = args.scan_type.parse()?;
    config = config.with_scan_type(scan_type);
    if let Some(ms) = args.timeout {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(width) = args.concurrency {
        config = config.with_concurrency(width);
    }
    if args.drop_failed_hosts {
        config = config.with_failure_policy(HostFailurePolicy::Drop);
    }

    config.validate().context("Invalid scan configuration")?;
    Ok(config)
}

fn build_scanner(targets: Vec<Ipv4Addr>, config: ScannerConfig) -> Result<Box<dyn Scanner>> {
    match config.scan_type {
        ScanType::Connect => Ok(Box::new(ConnectScanner::new(targets, config))),
        ScanType::Syn => match SynScanner::new(targets, config) {
            Ok(scanner) => Ok(Box::new(scanner)),
            Err(SynError::NotPermitted) => Err(anyhow!(
                "SYN scanning needs raw socket access. Run with sudo, grant CAP_NET_RAW, or use -s connect."
            )),
            Err(e) => Err(e).context("Failed to initialize SYN scanner"),
        },
    }
}

fn log_summary(results: &[HostResult], elapsed: Duration) {
    let up = results.iter().filter(|r| r.is_up()).count();
    let failed = results.iter().filter(|r| r.is_failed()).count();
    let open: usize = results.iter().map(|r| r.open.len()).sum();

    info!(
        hosts = results.len(),
        up,
        failed,
        open_ports = open,
        elapsed = ?elapsed,
        "Scan summary"
    );
    if failed > 0 {
        warn!("{} host(s) could not be scanned", failed);
    }
}

/// Parses a port string like "80,443,1000-1010" into a sorted list of
/// unique ports.
fn parse_ports(ports_str: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();

    for part in ports_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_port(start)?;
            let end = parse_port(end)?;
            if start > end {
                bail!("Invalid port range {}: start > end", part);
            }
            ports.extend(start..=end);
        } else {
            ports.push(parse_port(part)?);
        }
    }

    if ports.is_empty() {
        bail!("No ports specified");
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

fn parse_port(text: &str) -> Result<u16> {
    let text = text.trim();
    let port: u16 = text
        .parse()
        .with_context(|| format!("Invalid port: '{}'", text))?;
    if port == 0 {
        bail!("Port 0 cannot be scanned");
    }
    Ok(port)
}
