//! Prober trait abstraction and the values it produces.
//!
//! Defines a common interface for all probe implementations, so the worker
//! pool can run any technique without knowing which one it is.

use crate::services::get_service_description;
use crate::types::Port;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Status of a probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    /// Port is open (service listening).
    Open,
    /// Port is closed (connection actively refused).
    Closed,
    /// Port is filtered (no answer, possibly dropped by a firewall).
    Filtered,
    /// Port is either open or filtered (UDP ambiguity).
    #[serde(rename = "open|filtered")]
    OpenFiltered,
    /// Reachable, open/closed unknown (ACK probe).
    Unfiltered,
    /// The probe itself could not be carried out.
    Error,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Filtered => write!(f, "filtered"),
            Self::OpenFiltered => write!(f, "open|filtered"),
            Self::Unfiltered => write!(f, "unfiltered"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which flags a stealth technique would set on a crafted packet.
///
/// Only used for naming: every variant is carried out as a shortened
/// ordinary connect, since raw sockets are never opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StealthVariant {
    Fin,
    Xmas,
    Null,
    Window,
}

/// Available scan techniques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanTechnique {
    /// Full TCP connect (default, no special privileges required).
    #[default]
    Connect,
    /// UDP datagram probe with a port-specific payload.
    Udp,
    /// Connect-based approximation of a FIN/Xmas/Null/Window scan.
    StealthApprox(StealthVariant),
    /// Connect-based approximation of an ACK scan.
    Ack,
}

impl ScanTechnique {
    pub const ALL: [ScanTechnique; 7] = [
        Self::Connect,
        Self::Udp,
        Self::StealthApprox(StealthVariant::Fin),
        Self::StealthApprox(StealthVariant::Xmas),
        Self::StealthApprox(StealthVariant::Null),
        Self::StealthApprox(StealthVariant::Window),
        Self::Ack,
    ];

    /// Transport protocol the probe uses.
    pub const fn protocol(self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            _ => "TCP",
        }
    }

    /// Short selector name, as accepted by [`FromStr`].
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Udp => "udp",
            Self::StealthApprox(StealthVariant::Fin) => "fin",
            Self::StealthApprox(StealthVariant::Xmas) => "xmas",
            Self::StealthApprox(StealthVariant::Null) => "null",
            Self::StealthApprox(StealthVariant::Window) => "window",
            Self::Ack => "ack",
        }
    }
}

impl fmt::Display for ScanTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "TCP Connect"),
            Self::Udp => write!(f, "UDP"),
            Self::StealthApprox(StealthVariant::Fin) => write!(f, "FIN (approx.)"),
            Self::StealthApprox(StealthVariant::Xmas) => write!(f, "Xmas (approx.)"),
            Self::StealthApprox(StealthVariant::Null) => write!(f, "Null (approx.)"),
            Self::StealthApprox(StealthVariant::Window) => write!(f, "Window (approx.)"),
            Self::Ack => write!(f, "ACK (approx.)"),
        }
    }
}

impl FromStr for ScanTechnique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "connect" | "tcp" => Ok(Self::Connect),
            "udp" => Ok(Self::Udp),
            "fin" => Ok(Self::StealthApprox(StealthVariant::Fin)),
            "xmas" => Ok(Self::StealthApprox(StealthVariant::Xmas)),
            "null" => Ok(Self::StealthApprox(StealthVariant::Null)),
            "window" => Ok(Self::StealthApprox(StealthVariant::Window)),
            "ack" => Ok(Self::Ack),
            _ => Err(format!(
                "unknown scan technique '{}' (expected connect, udp, fin, xmas, null, window or ack)",
                s
            )),
        }
    }
}

impl Serialize for ScanTechnique {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.selector())
    }
}

impl<'de> Deserialize<'de> for ScanTechnique {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of probing a single port. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    /// The port that was probed.
    pub port: Port,
    /// Transport protocol, "TCP" or "UDP".
    pub protocol: &'static str,
    /// Status determined by the probe.
    pub status: PortStatus,
    /// Service name from the well-known ports table.
    pub service: String,
    /// Banner captured from the service, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// Time from task start to classification.
    pub response_time_ms: u64,
    /// Why the probe ended in `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    /// Create an outcome, looking the service name up from the port.
    pub fn new(port: Port, status: PortStatus, elapsed: Duration) -> Self {
        Self {
            port,
            protocol: ScanTechnique::Connect.protocol(),
            status,
            service: get_service_description(port.as_u16()).to_string(),
            banner: None,
            response_time_ms: elapsed.as_millis() as u64,
            detail: None,
        }
    }

    /// An `Error` outcome carrying the reason.
    pub fn error(port: Port, elapsed: Duration, reason: impl fmt::Display) -> Self {
        let mut outcome = Self::new(port, PortStatus::Error, elapsed);
        outcome.detail = Some(reason.to_string());
        outcome
    }

    /// Set the banner.
    pub fn with_banner(mut self, banner: Option<String>) -> Self {
        self.banner = banner;
        self
    }

    /// Stamp the transport protocol of the technique that produced this.
    pub fn with_protocol(mut self, technique: ScanTechnique) -> Self {
        self.protocol = technique.protocol();
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == PortStatus::Open
    }
}

/// Trait for probe implementations.
///
/// A prober is built once per session from its frozen configuration and
/// shared by every worker. `probe` must always resolve to exactly one
/// outcome for the port it was given, reporting failures as statuses
/// rather than errors.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Get the technique this prober implements.
    fn technique(&self) -> ScanTechnique;

    /// Upper bound on how long one probe may take to classify a port.
    fn timeout(&self) -> Duration;

    /// Probe a single port.
    async fn probe(&self, port: Port) -> ProbeOutcome;
}
