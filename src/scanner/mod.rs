//! Scanner module - one probe per port, per technique.
//!
//! This module provides the [`Prober`] trait and its TCP connect, UDP,
//! stealth-approximation and ACK-approximation implementations, plus the
//! failure classification they share.

pub mod classify;
pub mod connect;
pub mod stealth;
pub mod tcp;
pub mod traits;
pub mod udp;

use crate::types::Target;
use std::sync::Arc;
use std::time::Duration;

pub use stealth::{AckProber, StealthProber};
pub use tcp::TcpConnectProber;
pub use traits::{PortStatus, ProbeOutcome, Prober, ScanTechnique, StealthVariant};
pub use udp::UdpProber;

/// Build the prober for a technique.
///
/// `timeout` is the session timeout; techniques that use a shorter budget
/// derive it from this value.
pub fn create_prober(
    technique: ScanTechnique,
    target: Target,
    timeout: Duration,
    grab_banners: bool,
) -> Arc<dyn Prober> {
    match technique {
        ScanTechnique::Connect => Arc::new(TcpConnectProber::new(target, timeout, grab_banners)),
        ScanTechnique::Udp => Arc::new(UdpProber::new(target, timeout)),
        ScanTechnique::StealthApprox(variant) => {
            Arc::new(StealthProber::new(target, variant, timeout))
        }
        ScanTechnique::Ack => Arc::new(AckProber::new(target, timeout)),
    }
}
