//! Best-effort OS fingerprinting.
//!
//! Delegates to an external scanner (nmap by default) run as a subprocess.
//! When the tool is missing or fails, falls back to a guess based on which
//! well-known ports were found open.

use crate::engine::session::SessionConfig;
use crate::error::{ScanError, ScanResult};
use crate::scanner::{ScanTechnique, StealthVariant};
use crate::types::Port;
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Reported when neither the tool nor the port heuristic gives an answer.
pub const DETECTION_FAILED: &str = "OS detection failed: external tool unavailable";

/// Ports whose presence points at a Windows host: RDP, SMB, MSRPC.
const WINDOWS_PORTS: [u16; 3] = [3389, 445, 135];

const SSH_PORT: u16 = 22;

/// Where a fingerprint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintSource {
    /// Output of the external tool, relayed verbatim.
    Tool,
    /// Guess from the open ports of the session.
    Heuristic,
    /// Nothing to report.
    Unavailable,
}

/// Result of the OS fingerprint delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsFingerprint {
    pub source: FingerprintSource,
    /// Exit code of the tool, when it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output: String,
}

impl OsFingerprint {
    fn unavailable() -> Self {
        Self {
            source: FingerprintSource::Unavailable,
            exit_code: None,
            output: DETECTION_FAILED.to_string(),
        }
    }
}

/// Scan-type flag matching a technique.
pub fn scan_type_flag(technique: ScanTechnique) -> &'static str {
    match technique {
        ScanTechnique::Connect => "-sT",
        ScanTechnique::Udp => "-sU",
        ScanTechnique::StealthApprox(StealthVariant::Fin) => "-sF",
        ScanTechnique::StealthApprox(StealthVariant::Xmas) => "-sX",
        ScanTechnique::StealthApprox(StealthVariant::Null) => "-sN",
        ScanTechnique::StealthApprox(StealthVariant::Window) => "-sW",
        ScanTechnique::Ack => "-sA",
    }
}

/// Argument list for the external tool, derived from the session.
pub fn tool_args(config: &SessionConfig) -> Vec<String> {
    let mut args = vec![
        scan_type_flag(config.technique).to_string(),
        format!("-T{}", config.timing.level()),
    ];
    if config.flags.service_detection {
        args.push("-sV".to_string());
    }
    if config.flags.aggressive {
        args.push("-A".to_string());
    }
    args.push("-O".to_string());
    args.push("-p".to_string());
    args.push(config.ports.to_string());
    args.push(config.target.host().to_string());
    args
}

/// Guess the OS family from open ports.
pub fn guess_from_ports(open: &[Port]) -> Option<&'static str> {
    let is_open = |p: u16| open.iter().any(|port| port.as_u16() == p);

    if WINDOWS_PORTS.iter().any(|&p| is_open(p)) {
        Some("Windows (guessed from open ports)")
    } else if is_open(SSH_PORT) {
        Some("Linux/Unix (guessed from open ports)")
    } else {
        None
    }
}

/// Run the tool, failing when it cannot be spawned or exits non-zero.
async fn run_tool(tool: &str, args: &[String]) -> ScanResult<(Option<i32>, String)> {
    debug!(tool, ?args, "running OS fingerprint tool");

    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ScanError::ExternalToolUnavailable(format!("{}: {}", tool, e)))?;

    if !output.status.success() {
        return Err(ScanError::ExternalToolUnavailable(format!(
            "{} exited with {}",
            tool, output.status
        )));
    }

    Ok((
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Fingerprint the target of a finished session.
///
/// Never fails: a tool failure degrades to the port heuristic, and an
/// inconclusive heuristic to [`DETECTION_FAILED`].
pub async fn fingerprint(tool: &str, config: &SessionConfig, open: &[Port]) -> OsFingerprint {
    match run_tool(tool, &tool_args(config)).await {
        Ok((exit_code, output)) => {
            info!(scan_id = %config.id.short(), "OS fingerprint tool finished");
            OsFingerprint {
                source: FingerprintSource::Tool,
                exit_code,
                output,
            }
        }
        Err(e) => {
            warn!(scan_id = %config.id.short(), error = %e, "falling back to port heuristic");
            match guess_from_ports(open) {
                Some(guess) => OsFingerprint {
                    source: FingerprintSource::Heuristic,
                    exit_code: None,
                    output: guess.to_string(),
                },
                None => OsFingerprint::unavailable(),
            }
        }
    }
}
