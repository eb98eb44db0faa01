//! Command-line interface definitions for cyberscan.
//!
//! Uses `clap` derive macros for declarative argument parsing. Anything not
//! given on the command line falls back to the settings file.

mod scan;

use crate::scanner::ScanTechnique;
use crate::timing::TimingProfile;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// A concurrent network port scanner.
///
/// Probes every port of a target with the chosen technique and reports
/// open, closed, filtered and unfiltered ports. Stealth and ACK techniques
/// are approximated with ordinary connections; no raw packets are sent.
#[derive(Parser, Debug)]
#[command(name = "cyberscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A concurrent network port scanner", long_about = None)]
pub struct Cli {
    /// Target to scan: an IPv4 address or a hostname
    #[arg(value_name = "TARGET", required_unless_present = "init_config")]
    pub target: Option<String>,

    /// Ports to scan (e.g., "80", "80,443", "1-1000", "22,80,443,8000-9000")
    #[arg(short, long)]
    pub ports: Option<String>,

    /// Scan technique: connect, udp, fin, xmas, null, window or ack
    #[arg(short = 's', long)]
    pub technique: Option<ScanTechnique>,

    /// Timing template, t0 (slowest) to t5 (fastest)
    #[arg(short = 'T', long, value_enum)]
    pub timing: Option<TimingProfile>,

    /// Grab service banners from open ports
    #[arg(short = 'S', long)]
    pub service_detection: bool,

    /// Fingerprint the target OS once the scan completes
    #[arg(short = 'O', long)]
    pub os_detection: bool,

    /// Enable service and OS detection
    #[arg(short = 'A', long)]
    pub aggressive: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Show closed ports in the result table
    #[arg(long)]
    pub show_closed: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to custom configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the default settings file and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Cli {
    /// Run the command.
    pub async fn execute(self) -> crate::error::CliResult<()> {
        scan::execute(self).await
    }
}
