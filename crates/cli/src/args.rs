use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sweep")]
#[command(version)]
#[command(about = "A concurrent TCP port scanner (connect and SYN)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan targets for open TCP ports
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Targets: IPs, CIDR blocks, ranges or hostnames. Example: 10.0.0.0/24,example.com
    #[arg(short = 't', long, required = true)]
    pub targets: String,

    /// Ports to scan. Examples: 80,443 or 1-1024 or 22,80-90
    #[arg(short, long, default_value = "22,80,443,8000-8888")]
    pub ports: String,

    /// Probing strategy: "connect" (full handshake) or "syn" (raw SYN, needs CAP_NET_RAW)
    #[arg(short = 's', long, default_value = "connect", value_parser = ["connect", "tcp", "syn"])]
    pub scan_type: String,

    /// Timeout in milliseconds (overrides the preset)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Worker pool width (overrides the preset)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Timeout/width preset
    #[arg(long, value_enum, default_value_t = Preset::Balanced)]
    pub preset: Preset,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Leave hosts whose scan failed out of the results instead of reporting them
    #[arg(long)]
    pub drop_failed_hosts: bool,

    /// Also print hosts that did not answer
    #[arg(long)]
    pub show_down: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Fast,
    Balanced,
    Thorough,
    Stealth,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}
