//! UDP prober.
//!
//! Sends a protocol-specific datagram and waits for any reply. UDP gives no
//! handshake signal, and without raw sockets an ICMP port-unreachable cannot
//! be told apart from a silent drop, so a port that stays quiet is reported
//! as open|filtered rather than closed.

use crate::error::{ScanError, ScanResult};
use crate::scanner::connect::resolve;
use crate::scanner::traits::{PortStatus, ProbeOutcome, Prober, ScanTechnique};
use crate::types::{Port, Target};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Known UDP service payloads for better detection.
struct UdpPayload {
    port: u16,
    payload: &'static [u8],
}

/// DNS query: `version.bind` TXT in the CHAOS class.
const DNS_QUERY: &[u8] =
    b"\x63\x79\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\x07version\x04bind\x00\x00\x10\x00\x03";

/// BOOTP/DHCP DISCOVER, broadcast flag set, ending with option 53 and END.
const DHCP_DISCOVER: [u8; 244] = dhcp_discover();

const fn dhcp_discover() -> [u8; 244] {
    let mut p = [0u8; 244];
    p[0] = 0x01; // BOOTREQUEST
    p[1] = 0x01; // Ethernet
    p[2] = 0x06; // hardware address length
    p[4] = 0x63; // transaction id
    p[5] = 0x79;
    p[6] = 0x62;
    p[7] = 0x72;
    p[10] = 0x80; // broadcast flag
    p[28] = 0x02; // locally administered client MAC
    p[29] = 0x63;
    p[30] = 0x79;
    p[31] = 0x62;
    p[32] = 0x72;
    p[33] = 0x01;
    p[236] = 0x63; // magic cookie
    p[237] = 0x82;
    p[238] = 0x53;
    p[239] = 0x63;
    p[240] = 53; // DHCP message type
    p[241] = 1;
    p[242] = 1; // DISCOVER
    p[243] = 0xff; // END
    p
}

/// TFTP read request, octet mode.
const TFTP_READ: &[u8] = b"\x00\x01probe.txt\x00octet\x00";

/// NTPv3 client request: LI 0, version 3, mode 3.
const NTP_REQUEST: [u8; 48] = {
    let mut p = [0u8; 48];
    p[0] = 0x1b;
    p
};

/// SNMPv1 get-request for sysDescr.0 with community `public`.
const SNMP_GET: &[u8] = b"\x30\x29\x02\x01\x00\x04\x06public\xa0\x1c\x02\x04\x63\x79\x62\x72\x02\x01\x00\x02\x01\x00\x30\x0e\x30\x0c\x06\x08\x2b\x06\x01\x02\x01\x01\x01\x00\x05\x00";

/// Syslog user-level notice.
const SYSLOG_MESSAGE: &[u8] = b"<14>cyberscan: udp probe\n";

/// Common UDP service payloads.
const UDP_PAYLOADS: &[UdpPayload] = &[
    UdpPayload {
        port: 53,
        payload: DNS_QUERY,
    },
    UdpPayload {
        port: 67,
        payload: &DHCP_DISCOVER,
    },
    UdpPayload {
        port: 69,
        payload: TFTP_READ,
    },
    UdpPayload {
        port: 123,
        payload: &NTP_REQUEST,
    },
    UdpPayload {
        port: 161,
        payload: SNMP_GET,
    },
    UdpPayload {
        port: 514,
        payload: SYSLOG_MESSAGE,
    },
];

/// Default payload for unknown ports.
const DEFAULT_PAYLOAD: &[u8] = b"\x00";

/// Get the appropriate payload for a port.
pub fn payload_for_port(port: u16) -> &'static [u8] {
    UDP_PAYLOADS
        .iter()
        .find(|p| p.port == port)
        .map(|p| p.payload)
        .unwrap_or(DEFAULT_PAYLOAD)
}

/// UDP prober for detecting open UDP ports.
pub struct UdpProber {
    target: Target,
    timeout: Duration,
}

impl UdpProber {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Bind, connect, and send the payload. Any failure here is a setup
    /// failure of the probe, not a statement about the port.
    async fn send_payload(&self, port: Port) -> ScanResult<UdpSocket> {
        let addr = resolve(&self.target, port).await?;
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => SocketAddr::from(([0u8; 4], 0)),
            SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
        };

        let setup = |e: std::io::Error| ScanError::probe(port.as_u16(), e.to_string());
        let socket = UdpSocket::bind(local).await.map_err(setup)?;
        socket.connect(addr).await.map_err(setup)?;
        socket
            .send(payload_for_port(port.as_u16()))
            .await
            .map_err(setup)?;
        Ok(socket)
    }
}

#[async_trait]
impl Prober for UdpProber {
    fn technique(&self) -> ScanTechnique {
        ScanTechnique::Udp
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, port: Port) -> ProbeOutcome {
        let start = Instant::now();

        let socket = match timeout(self.timeout, self.send_payload(port)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                debug!(%port, error = %e, "udp probe could not be sent");
                return ProbeOutcome::error(port, start.elapsed(), e);
            }
            Err(_) => return ProbeOutcome::new(port, PortStatus::OpenFiltered, start.elapsed()),
        };

        let remaining = self.timeout.saturating_sub(start.elapsed());
        let mut buf = [0u8; 1024];
        let status = match timeout(remaining, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                trace!(%port, bytes = n, "udp reply");
                PortStatus::Open
            }
            Ok(Err(e)) => {
                trace!(%port, error = %e, "udp receive failed");
                PortStatus::OpenFiltered
            }
            Err(_) => PortStatus::OpenFiltered,
        };

        ProbeOutcome::new(port, status, start.elapsed())
    }
}
