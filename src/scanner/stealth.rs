//! Connect-based approximations of the stealth and ACK techniques.
//!
//! Crafting FIN/Xmas/Null/Window/ACK segments needs raw sockets and elevated
//! privileges. These probers instead make an ordinary connection with a
//! shortened deadline and map the result onto the status vocabulary of the
//! technique they stand in for. They are not stealthy: the target still sees
//! a normal handshake attempt.

use crate::scanner::classify::{ack_status, stealth_status};
use crate::scanner::connect::{connect_within, ConnectError};
use crate::scanner::traits::{PortStatus, ProbeOutcome, Prober, ScanTechnique, StealthVariant};
use crate::types::{Port, Target};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// Approximation of a FIN, Xmas, Null, or Window scan.
///
/// Each attempt gets a third of the session timeout.
pub struct StealthProber {
    target: Target,
    variant: StealthVariant,
    timeout: Duration,
}

impl StealthProber {
    pub fn new(target: Target, variant: StealthVariant, session_timeout: Duration) -> Self {
        Self {
            target,
            variant,
            timeout: session_timeout / 3,
        }
    }
}

#[async_trait]
impl Prober for StealthProber {
    fn technique(&self) -> ScanTechnique {
        ScanTechnique::StealthApprox(self.variant)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, port: Port) -> ProbeOutcome {
        let start = Instant::now();
        match connect_within(&self.target, port, self.timeout).await {
            Ok(_) => ProbeOutcome::new(port, PortStatus::Open, start.elapsed()),
            Err(ConnectError::Failed(failure)) => {
                ProbeOutcome::new(port, stealth_status(failure), start.elapsed())
            }
            Err(ConnectError::Setup(e)) => {
                debug!(%port, error = %e, "probe could not be attempted");
                ProbeOutcome::error(port, start.elapsed(), e)
            }
        }
    }
}

/// Approximation of an ACK scan: reachability only, never open/closed.
///
/// Each attempt gets a quarter of the session timeout.
pub struct AckProber {
    target: Target,
    timeout: Duration,
}

impl AckProber {
    pub fn new(target: Target, session_timeout: Duration) -> Self {
        Self {
            target,
            timeout: session_timeout / 4,
        }
    }
}

#[async_trait]
impl Prober for AckProber {
    fn technique(&self) -> ScanTechnique {
        ScanTechnique::Ack
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, port: Port) -> ProbeOutcome {
        let start = Instant::now();
        match connect_within(&self.target, port, self.timeout).await {
            Ok(_) => ProbeOutcome::new(port, PortStatus::Unfiltered, start.elapsed()),
            Err(ConnectError::Failed(failure)) => {
                ProbeOutcome::new(port, ack_status(failure), start.elapsed())
            }
            Err(ConnectError::Setup(e)) => {
                debug!(%port, error = %e, "probe could not be attempted");
                ProbeOutcome::error(port, start.elapsed(), e)
            }
        }
    }
}
