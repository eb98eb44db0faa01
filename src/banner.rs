//! Banner grabbing for open TCP connections.
//!
//! Which ports are read passively, which get an HTTP request, and which get
//! a fixed placeholder is decided by [`BannerRule::for_port`].

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Maximum bytes to read for a banner.
const MAX_READ_SIZE: usize = 1024;

/// Longest banner kept, truncation marker included.
pub const MAX_BANNER_LEN: usize = 100;

const TRUNCATION_MARKER: &str = "...";

/// Reported for TLS ports, where no handshake is attempted.
pub const TLS_PLACEHOLDER: &str = "SSL/TLS (encrypted)";

/// Reported for RDP, which never sends a plaintext greeting.
pub const RDP_PLACEHOLDER: &str = "RDP (Remote Desktop)";

/// How to obtain a banner on a given port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerRule {
    /// Wait for the service to speak first.
    Passive(Duration),
    /// Send a minimal HTTP request and read the reply.
    Http(Duration),
    /// Do not read at all; report a fixed string.
    Placeholder(&'static str),
}

impl BannerRule {
    pub fn for_port(port: u16) -> Self {
        match port {
            21 | 22 | 25 | 110 | 143 => Self::Passive(Duration::from_millis(1000)),
            80 | 8080 => Self::Http(Duration::from_millis(2000)),
            443 | 8443 => Self::Placeholder(TLS_PLACEHOLDER),
            3389 => Self::Placeholder(RDP_PLACEHOLDER),
            _ => Self::Passive(Duration::from_millis(500)),
        }
    }
}

/// Grab a banner from an already connected stream.
///
/// `host` is used for the HTTP `Host:` header. Returns `None` when the
/// service sent nothing usable within the rule's wait.
pub async fn grab_banner_from_stream<S>(mut stream: S, port: u16, host: &str) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match BannerRule::for_port(port) {
        BannerRule::Placeholder(text) => Some(text.to_string()),
        BannerRule::Passive(wait) => {
            let data = read_some(&mut stream, wait).await?;
            sanitize_banner(&data)
        }
        BannerRule::Http(wait) => {
            let request = format!("HEAD / HTTP/1.0\r\nHost: {host}\r\n\r\n");
            stream.write_all(request.as_bytes()).await.ok()?;
            let data = read_some(&mut stream, wait).await?;
            let text = String::from_utf8_lossy(&data);
            sanitize_banner(http_banner(&text).as_bytes())
        }
    }
}

async fn read_some<S: AsyncRead + Unpin>(stream: &mut S, wait: Duration) -> Option<Vec<u8>> {
    let mut buffer = vec![0u8; MAX_READ_SIZE];
    match timeout(wait, stream.read(&mut buffer)).await {
        Ok(Ok(n)) if n > 0 => {
            buffer.truncate(n);
            Some(buffer)
        }
        _ => None,
    }
}

/// The `Server:` header value of an HTTP response, else its first line.
pub fn http_banner(response: &str) -> &str {
    let mut lines = response.lines();
    let first = lines.next().unwrap_or_default();

    lines
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("server")
                .then(|| value.trim())
        })
        .unwrap_or_else(|| first.trim())
}

/// Strip control and non-ASCII bytes and cap the length at
/// [`MAX_BANNER_LEN`] characters.
pub fn sanitize_banner(data: &[u8]) -> Option<String> {
    let result: String = data
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect();

    let trimmed = result.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() > MAX_BANNER_LEN {
        let keep = MAX_BANNER_LEN - TRUNCATION_MARKER.len();
        Some(format!("{}{}", &trimmed[..keep], TRUNCATION_MARKER))
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_rules() {
        assert_eq!(
            BannerRule::for_port(22),
            BannerRule::Passive(Duration::from_millis(1000))
        );
        assert_eq!(
            BannerRule::for_port(8080),
            BannerRule::Http(Duration::from_millis(2000))
        );
        assert_eq!(
            BannerRule::for_port(8443),
            BannerRule::Placeholder(TLS_PLACEHOLDER)
        );
        assert_eq!(
            BannerRule::for_port(3389),
            BannerRule::Placeholder(RDP_PLACEHOLDER)
        );
        assert_eq!(
            BannerRule::for_port(6379),
            BannerRule::Passive(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_sanitize_banner() {
        let data = b"SSH-2.0-OpenSSH_8.9\r\n";
        assert_eq!(sanitize_banner(data).as_deref(), Some("SSH-2.0-OpenSSH_8.9"));
    }

    #[test]
    fn test_sanitize_strips_binary_data() {
        let data = b"\x00\x01Hello\x02World\x03 \xff\xfeok";
        assert_eq!(sanitize_banner(data).as_deref(), Some("HelloWorld ok"));
        assert_eq!(sanitize_banner(b"\x00\x01\r\n"), None);
    }

    #[test]
    fn test_sanitize_drops_line_breaks_and_tabs() {
        let data = b"220-a\r\n220  b\tc";
        assert_eq!(sanitize_banner(data).as_deref(), Some("220-a220  bc"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let data = "A".repeat(250);
        let banner = sanitize_banner(data.as_bytes()).unwrap();
        assert_eq!(banner.len(), MAX_BANNER_LEN);
        assert!(banner.ends_with("..."));

        let exact = "B".repeat(MAX_BANNER_LEN);
        assert_eq!(sanitize_banner(exact.as_bytes()).unwrap(), exact);
    }

    #[test]
    fn test_http_server_header() {
        let response = "HTTP/1.1 200 OK\r\nDate: Mon\r\nServer: nginx/1.18.0\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(http_banner(response), "nginx/1.18.0");
    }

    #[test]
    fn test_http_without_server_header() {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\n\r\nServer: fake";
        assert_eq!(http_banner(response), "HTTP/1.1 404 Not Found");
    }

    #[tokio::test]
    async fn test_http_grab_over_stream() {
        let (client, mut server) = duplex(4096);

        let responder = tokio::spawn(async move {
            let mut request = vec![0u8; 512];
            let n = server.read(&mut request).await.unwrap();
            let request = String::from_utf8_lossy(&request[..n]).to_string();
            server
                .write_all(b"HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            request
        });

        let banner = grab_banner_from_stream(client, 80, "example.com").await;
        assert_eq!(banner.as_deref(), Some("nginx/1.18.0"));

        let request = responder.await.unwrap();
        assert!(request.starts_with("HEAD / HTTP/1.0\r\n"));
        assert!(request.contains("Host: example.com"));
    }

    #[tokio::test]
    async fn test_passive_grab_times_out_quietly() {
        let (client, _server) = duplex(64);
        let banner = grab_banner_from_stream(client, 6379, "localhost").await;
        assert_eq!(banner, None);
    }

    #[tokio::test]
    async fn test_placeholder_does_not_read() {
        let (client, _server) = duplex(64);
        let banner = grab_banner_from_stream(client, 443, "localhost").await;
        assert_eq!(banner.as_deref(), Some(TLS_PLACEHOLDER));
    }
}
