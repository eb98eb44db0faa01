//! # cyberscan - A Concurrent Network Port Scanner
//!
//! cyberscan probes the ports of a single host and reports, per port, a
//! reachability status, the well-known service, and optionally a banner.
//!
//! ## Features
//!
//! - **Scan Techniques**: TCP connect, UDP with protocol payloads, and
//!   connect-based approximations of FIN/Xmas/Null/Window and ACK scans
//! - **Timing Templates**: T0-T5, mapping to a per-probe timeout and a
//!   CPU-scaled worker count
//! - **Banner Grabbing**: Passive reads, HTTP `Server` extraction, and
//!   fixed placeholders for TLS and RDP
//! - **Live Events**: Progress, outcomes and completion published to any
//!   number of subscribers
//! - **OS Fingerprinting**: Delegated to nmap, with a port-based fallback
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cyberscan::engine::{EngineConfig, Orchestrator, ScanRequest};
//! use cyberscan::timing::TimingProfile;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cyberscan::ScanError> {
//!     let mut orchestrator = Orchestrator::new(EngineConfig::default());
//!     let request = ScanRequest::new("192.168.1.1", "22,80,443")
//!         .timing(TimingProfile::Aggressive);
//!
//!     orchestrator.start(request).await?;
//!     if let Some(session) = orchestrator.wait().await {
//!         for outcome in session.outcomes() {
//!             println!("Port {} is {}", outcome.port, outcome.status);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Validated targets, ports and port sets
//! - [`timing`] - Timing templates
//! - [`scanner`] - The `Prober` trait and one prober per technique
//! - [`banner`] - Banner grabbing rules
//! - [`engine`] - Orchestrator, worker pool, aggregator and events
//! - [`osfp`] - OS fingerprint delegate
//! - [`config`] - Settings file
//! - [`error`] - Error types

pub mod banner;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod osfp;
pub mod output;
pub mod scanner;
pub mod services;
pub mod timing;
pub mod types;

// Re-export commonly used types
pub use engine::{Orchestrator, ScanEvent, ScanRequest, ScanState};
pub use error::{CliError, ScanError};
pub use scanner::{PortStatus, ProbeOutcome, Prober, ScanTechnique};
pub use types::{Port, PortSet, ScanId, Target};
