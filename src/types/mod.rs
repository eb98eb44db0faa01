//! Core type definitions using newtype patterns for type safety.
//!
//! A `Port` is always in 1-65535, a `PortSet` is always sorted and unique,
//! and a `Target` has always passed validation.

mod port;
mod scan_id;
mod target;

pub use port::{Port, PortError, PortRange, PortSet};
pub use scan_id::ScanId;
pub use target::{Target, TargetError, TargetKind};
