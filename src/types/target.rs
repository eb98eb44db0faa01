//! Target validation.
//!
//! A target is either a dotted-quad IPv4 literal or a hostname. Validation is
//! purely syntactic: no DNS lookup happens here, resolution is left to the
//! connection attempt made by each probe.

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length of a single hostname label.
const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a full hostname.
const MAX_HOSTNAME_LEN: usize = 253;

/// What kind of host a validated target names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Ipv4(Ipv4Addr),
    Hostname,
}

/// A validated scan target, immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct Target {
    host: String,
    kind: TargetKind,
}

impl Target {
    /// Validate a target string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let host = s.trim();
        if host.is_empty() {
            return Err(TargetError::Empty);
        }

        // Anything made only of digits and dots must be a real IPv4 literal,
        // otherwise "999.1.1.1" would pass as a hostname.
        if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return parse_ipv4(host)
                .map(|ip| Self {
                    host: host.to_string(),
                    kind: TargetKind::Ipv4(ip),
                })
                .ok_or_else(|| TargetError::InvalidIpv4(host.to_string()));
        }

        if is_valid_hostname(host) {
            Ok(Self {
                host: host.to_string(),
                kind: TargetKind::Hostname,
            })
        } else {
            Err(TargetError::InvalidFormat(host.to_string()))
        }
    }

    /// The host string as given (trimmed).
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// The IPv4 address, when the target is a literal.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        match self.kind {
            TargetKind::Ipv4(ip) => Some(ip),
            TargetKind::Hostname => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.host
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error type for target validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,
    #[error("invalid IPv4 address: {0}")]
    InvalidIpv4(String),
    #[error("not an IPv4 address or hostname: {0}")]
    InvalidFormat(String),
}

/// Parse a dotted quad with every octet in 0-255.
fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');

    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 {
            return None;
        }
        *octet = part.parse().ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Check if a string is a valid hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_literal() {
        let target = Target::parse("127.0.0.1").unwrap();
        assert_eq!(target.ipv4(), Some(Ipv4Addr::LOCALHOST));
        assert!(Target::parse("0.0.0.0").is_ok());
        assert!(Target::parse("255.255.255.255").is_ok());
    }

    #[test]
    fn test_bad_ipv4() {
        assert!(matches!(
            Target::parse("999.1.1.1"),
            Err(TargetError::InvalidIpv4(_))
        ));
        assert!(Target::parse("1.2.3").is_err());
        assert!(Target::parse("1.2.3.4.5").is_err());
        assert!(Target::parse("1..2.3").is_err());
        assert!(Target::parse("1234.1.1.1").is_err());
    }

    #[test]
    fn test_hostnames() {
        let target = Target::parse("my-host.example.com").unwrap();
        assert_eq!(target.kind(), TargetKind::Hostname);
        assert_eq!(target.host(), "my-host.example.com");
        assert!(Target::parse("localhost").is_ok());
        assert!(Target::parse("10.example").is_ok());
    }

    #[test]
    fn test_rejected_hostnames() {
        assert!(Target::parse("-badhost").is_err());
        assert!(Target::parse("badhost-").is_err());
        assert!(Target::parse("bad_host.com").is_err());
        assert!(Target::parse("host..com").is_err());
        assert!(Target::parse("bücher.de").is_err());
        assert!(Target::parse(&"a".repeat(64)).is_err());
        assert!(Target::parse(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_empty() {
        assert_eq!(Target::parse(""), Err(TargetError::Empty));
        assert_eq!(Target::parse("   "), Err(TargetError::Empty));
    }
}
