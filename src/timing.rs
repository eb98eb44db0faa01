//! Timing profiles.
//!
//! Each tier maps deterministically to a per-probe timeout and a worker
//! concurrency scaled by the number of available CPUs.

use crate::scanner::ScanTechnique;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Aggressiveness tier, T0 (slowest) to T5 (fastest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
pub enum TimingProfile {
    #[value(name = "t0", alias = "paranoid")]
    #[serde(rename = "T0", alias = "paranoid")]
    Paranoid,
    #[value(name = "t1", alias = "sneaky")]
    #[serde(rename = "T1", alias = "sneaky")]
    Sneaky,
    #[value(name = "t2", alias = "polite")]
    #[serde(rename = "T2", alias = "polite")]
    Polite,
    #[default]
    #[value(name = "t3", alias = "normal")]
    #[serde(rename = "T3", alias = "normal")]
    Normal,
    #[value(name = "t4", alias = "aggressive")]
    #[serde(rename = "T4", alias = "aggressive")]
    Aggressive,
    #[value(name = "t5", alias = "insane")]
    #[serde(rename = "T5", alias = "insane")]
    Insane,
}

/// What a timing tier resolves to for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingPolicy {
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    pub timeout: Duration,
    pub concurrency: usize,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl TimingProfile {
    /// All tiers, slowest first.
    pub const ALL: [TimingProfile; 6] = [
        Self::Paranoid,
        Self::Sneaky,
        Self::Polite,
        Self::Normal,
        Self::Aggressive,
        Self::Insane,
    ];

    /// Numeric tier, 0-5.
    pub const fn level(self) -> u8 {
        match self {
            Self::Paranoid => 0,
            Self::Sneaky => 1,
            Self::Polite => 2,
            Self::Normal => 3,
            Self::Aggressive => 4,
            Self::Insane => 5,
        }
    }

    pub const fn timeout(self) -> Duration {
        Duration::from_millis(match self {
            Self::Paranoid => 5000,
            Self::Sneaky => 3000,
            Self::Polite => 2000,
            Self::Normal => 1000,
            Self::Aggressive => 500,
            Self::Insane => 250,
        })
    }

    /// Worker concurrency for a machine with `cpus` cores.
    pub fn concurrency(self, cpus: usize) -> usize {
        let cpus = cpus.max(1);
        match self {
            Self::Paranoid => 1,
            Self::Sneaky => (cpus / 4).max(1),
            Self::Polite => (cpus / 2).max(1),
            Self::Normal => cpus * 2,
            Self::Aggressive => cpus * 4,
            Self::Insane => cpus * 8,
        }
    }

    /// Resolve the tier for a technique on this machine.
    pub fn policy(self, technique: ScanTechnique) -> TimingPolicy {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.policy_for(technique, cpus)
    }

    /// Resolve the tier for a technique with an explicit CPU count.
    ///
    /// UDP probes wait out the full timeout far more often, so their
    /// concurrency is halved.
    pub fn policy_for(self, technique: ScanTechnique, cpus: usize) -> TimingPolicy {
        let mut concurrency = self.concurrency(cpus);
        if technique == ScanTechnique::Udp {
            concurrency = (concurrency / 2).max(1);
        }
        TimingPolicy {
            timeout: self.timeout(),
            concurrency,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Paranoid => "Paranoid",
            Self::Sneaky => "Sneaky",
            Self::Polite => "Polite",
            Self::Normal => "Normal",
            Self::Aggressive => "Aggressive",
            Self::Insane => "Insane",
        }
    }
}

impl fmt::Display for TimingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} ({})", self.level(), self.name())
    }
}
