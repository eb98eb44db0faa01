//! TCP Connect prober.
//!
//! Performs standard TCP connect probes using the operating system's
//! socket API. This is the most reliable technique but also the most
//! detectable as it completes the full TCP handshake.

use crate::banner::grab_banner_from_stream;
use crate::scanner::classify::connect_status;
use crate::scanner::connect::{connect_within, ConnectError};
use crate::scanner::traits::{PortStatus, ProbeOutcome, Prober, ScanTechnique};
use crate::types::{Port, Target};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// TCP Connect prober.
///
/// Uses standard socket connect() calls to determine port status.
/// Does not require elevated privileges.
///
/// # Characteristics
///
/// - **Reliability**: High - uses OS-level connection establishment
/// - **Stealth**: Low - completes full TCP handshake, easily logged
/// - **Banners**: Optional, read after the handshake on open ports
pub struct TcpConnectProber {
    target: Target,
    timeout: Duration,
    grab_banners: bool,
}

impl TcpConnectProber {
    /// Create a new TCP connect prober.
    ///
    /// # Arguments
    /// * `target` - Validated target to probe
    /// * `timeout` - Connection timeout per port
    /// * `grab_banners` - Whether to attempt banner grabbing on open ports
    pub fn new(target: Target, timeout: Duration, grab_banners: bool) -> Self {
        Self {
            target,
            timeout,
            grab_banners,
        }
    }
}

#[async_trait]
impl Prober for TcpConnectProber {
    fn technique(&self) -> ScanTechnique {
        ScanTechnique::Connect
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, port: Port) -> ProbeOutcome {
        let start = Instant::now();

        match connect_within(&self.target, port, self.timeout).await {
            Ok(stream) => {
                let outcome = ProbeOutcome::new(port, PortStatus::Open, start.elapsed());
                let banner = if self.grab_banners {
                    grab_banner_from_stream(stream, port.as_u16(), self.target.host()).await
                } else {
                    None
                };
                trace!(%port, banner = ?banner, "port open");
                outcome.with_banner(banner)
            }
            Err(ConnectError::Failed(failure)) => {
                let elapsed = start.elapsed();
                let status = connect_status(failure, elapsed, self.timeout);
                trace!(%port, ?failure, %status, "connect failed");
                ProbeOutcome::new(port, status, elapsed)
            }
            Err(ConnectError::Setup(e)) => {
                debug!(%port, error = %e, "probe could not be attempted");
                ProbeOutcome::error(port, start.elapsed(), e)
            }
        }
    }
}
