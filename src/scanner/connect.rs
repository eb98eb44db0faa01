//! Bounded TCP connection attempts shared by the TCP-based probers.

use crate::error::{ScanError, ScanResult};
use crate::scanner::classify::ConnectFailure;
use crate::types::{Port, Target};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::timeout;

/// Why a connection attempt produced no stream.
#[derive(Debug)]
pub enum ConnectError {
    /// The probe could not even be attempted (resolution or local socket).
    Setup(ScanError),
    /// The attempt was made and failed.
    Failed(ConnectFailure),
}

/// Resolve `target:port` to the first socket address.
///
/// IPv4 literals are used directly. Hostnames go through the system
/// resolver here, at probe time, never during validation.
pub async fn resolve(target: &Target, port: Port) -> ScanResult<SocketAddr> {
    if let Some(ip) = target.ipv4() {
        return Ok(SocketAddr::new(IpAddr::V4(ip), port.as_u16()));
    }

    lookup_host((target.host(), port.as_u16()))
        .await
        .map_err(|e| ScanError::probe(port.as_u16(), format!("cannot resolve {}: {}", target, e)))?
        .next()
        .ok_or_else(|| ScanError::probe(port.as_u16(), format!("no addresses for {}", target)))
}

/// Connect to `target:port`, giving up after `budget`.
///
/// Resolution counts against the same budget.
pub async fn connect_within(
    target: &Target,
    port: Port,
    budget: Duration,
) -> Result<TcpStream, ConnectError> {
    let attempt = async {
        let addr = resolve(target, port).await.map_err(ConnectError::Setup)?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| {
            ConnectError::Setup(ScanError::probe(
                port.as_u16(),
                format!("socket setup failed: {}", e),
            ))
        })?;

        socket
            .connect(addr)
            .await
            .map_err(|e| ConnectError::Failed(ConnectFailure::from_io(&e)))
    };

    match timeout(budget, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Failed(ConnectFailure::TimedOut)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolve_literal_skips_dns() {
        let target = Target::parse("10.1.2.3").unwrap();
        let addr = resolve(&target, Port::new(8080).unwrap()).await.unwrap();
        assert_eq!(addr, "10.1.2.3:8080".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = Port::new(listener.local_addr().unwrap().port()).unwrap();
        let target = Target::parse("127.0.0.1").unwrap();

        let stream = connect_within(&target, port, Duration::from_secs(1)).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = Port::new(listener.local_addr().unwrap().port()).unwrap();
        drop(listener);

        let target = Target::parse("127.0.0.1").unwrap();
        let result = connect_within(&target, port, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(ConnectError::Failed(ConnectFailure::Refused))
        ));
    }
}
