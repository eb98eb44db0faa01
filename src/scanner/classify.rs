//! Mapping of connection failures to port statuses.
//!
//! OS error codes differ between platforms, so failures are first reduced to
//! a small portable [`ConnectFailure`] and each technique then looks its
//! status up in a fixed table.

use crate::scanner::traits::PortStatus;
use std::io;
use std::time::Duration;

/// Portable classification of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The peer answered with a reset.
    Refused,
    /// No answer before the deadline.
    TimedOut,
    HostUnreachable,
    NetworkUnreachable,
    /// Anything the platform reported that fits none of the above.
    Unclassified,
}

impl ConnectFailure {
    /// Reduce an I/O error from `connect` to a portable class.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => return Self::Refused,
            io::ErrorKind::TimedOut => return Self::TimedOut,
            _ => {}
        }

        #[cfg(unix)]
        {
            match err.raw_os_error() {
                Some(libc::ECONNREFUSED) => return Self::Refused,
                Some(libc::ETIMEDOUT) => return Self::TimedOut,
                Some(libc::EHOSTUNREACH | libc::EHOSTDOWN) => return Self::HostUnreachable,
                Some(libc::ENETUNREACH | libc::ENETDOWN) => return Self::NetworkUnreachable,
                _ => {}
            }
        }

        Self::Unclassified
    }
}

/// Status table for a full TCP connect probe.
///
/// An unclassified failure falls back to [`elapsed_heuristic`].
pub fn connect_status(failure: ConnectFailure, elapsed: Duration, timeout: Duration) -> PortStatus {
    match failure {
        ConnectFailure::Refused => PortStatus::Closed,
        ConnectFailure::TimedOut
        | ConnectFailure::HostUnreachable
        | ConnectFailure::NetworkUnreachable => PortStatus::Filtered,
        ConnectFailure::Unclassified => elapsed_heuristic(elapsed, timeout),
    }
}

/// Status table for the connect-based stealth approximations.
pub fn stealth_status(failure: ConnectFailure) -> PortStatus {
    match failure {
        ConnectFailure::Refused => PortStatus::Closed,
        _ => PortStatus::Filtered,
    }
}

/// Status table for the connect-based ACK approximation.
pub fn ack_status(_failure: ConnectFailure) -> PortStatus {
    PortStatus::Filtered
}

/// Fallback for failures the platform does not let us classify: a quick
/// failure is treated as an active rejection, a slow one as a drop.
///
/// This is a heuristic. It is not guaranteed to hold on every platform.
pub fn elapsed_heuristic(elapsed: Duration, timeout: Duration) -> PortStatus {
    if elapsed < timeout / 2 {
        PortStatus::Closed
    } else {
        PortStatus::Filtered
    }
}
