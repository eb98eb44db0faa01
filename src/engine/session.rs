//! Session state: the frozen configuration of one run and the progress
//! accumulated while it executes.

use crate::engine::ScanFlags;
use crate::scanner::{PortStatus, ProbeOutcome, ScanTechnique};
use crate::timing::{TimingPolicy, TimingProfile};
use crate::types::{PortSet, ScanId, Target};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inputs of a run, fixed when the run is accepted and shared read-only
/// with every probe task.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub id: ScanId,
    pub target: Target,
    pub ports: PortSet,
    pub technique: ScanTechnique,
    pub timing: TimingProfile,
    pub policy: TimingPolicy,
    pub flags: ScanFlags,
}

/// Point-in-time progress of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// `floor(completed * 100 / total)`.
    pub percent: u8,
    /// Ports classified per second since the run started.
    pub rate: f64,
}

impl ProgressSnapshot {
    pub fn compute(completed: usize, total: usize, elapsed: Duration) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (completed.min(total) * 100 / total) as u8
        };
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };
        Self {
            completed,
            total,
            percent,
            rate,
        }
    }
}

/// One run: frozen configuration plus the state the aggregator mutates.
///
/// Only the aggregator task holds a mutable session while a run is live.
#[derive(Debug, Clone)]
pub struct ScanSession {
    config: Arc<SessionConfig>,
    started_at: DateTime<Utc>,
    started: Instant,
    completed: usize,
    open: usize,
    outcomes: Vec<ProbeOutcome>,
    duration: Option<Duration>,
    stopped: bool,
}

impl ScanSession {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        let capacity = config.ports.len();
        Self {
            config,
            started_at: Utc::now(),
            started: Instant::now(),
            completed: 0,
            open: 0,
            outcomes: Vec::with_capacity(capacity),
            duration: None,
            stopped: false,
        }
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn id(&self) -> ScanId {
        self.config.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total(&self) -> usize {
        self.config.ports.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Ports classified `Open`. `OpenFiltered` is not counted.
    pub fn open_count(&self) -> usize {
        self.open
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }

    pub fn is_terminal(&self) -> bool {
        self.duration.is_some()
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total()
    }

    /// Time since start, frozen once the session is terminal.
    pub fn elapsed(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.started.elapsed())
    }

    /// Record one outcome. Returns `false` and leaves the session untouched
    /// once it is terminal.
    pub fn apply(&mut self, outcome: ProbeOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.completed += 1;
        if outcome.is_open() {
            self.open += 1;
        }
        self.outcomes.push(outcome);
        true
    }

    /// Freeze the session. Later calls are ignored.
    pub fn finish(&mut self, stopped: bool) {
        if self.is_terminal() {
            return;
        }
        self.duration = Some(self.started.elapsed());
        self.stopped = stopped;
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot::compute(self.completed, self.total(), self.elapsed())
    }

    /// Count of outcomes with the given status.
    pub fn count(&self, status: PortStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn report(&self) -> ScanReport {
        let mut outcomes = self.outcomes.clone();
        outcomes.sort_by_key(|o| o.port);

        ScanReport {
            id: self.config.id,
            started_at: self.started_at,
            target: self.config.target.to_string(),
            technique: self.config.technique,
            timing: self.config.timing,
            ports_scanned: self.total(),
            completed: self.completed,
            open: self.open,
            closed: self.count(PortStatus::Closed),
            filtered: self.count(PortStatus::Filtered),
            open_filtered: self.count(PortStatus::OpenFiltered),
            unfiltered: self.count(PortStatus::Unfiltered),
            errors: self.count(PortStatus::Error),
            stopped: self.stopped,
            duration_ms: self.elapsed().as_millis() as u64,
            outcomes,
        }
    }
}

/// Serializable summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub id: ScanId,
    pub started_at: DateTime<Utc>,
    pub target: String,
    pub technique: ScanTechnique,
    pub timing: TimingProfile,
    pub ports_scanned: usize,
    pub completed: usize,
    pub open: usize,
    pub closed: usize,
    pub filtered: usize,
    pub open_filtered: usize,
    pub unfiltered: usize,
    pub errors: usize,
    pub stopped: bool,
    pub duration_ms: u64,
    pub outcomes: Vec<ProbeOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    fn config(ports: &str) -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            id: ScanId::new(),
            target: Target::parse("127.0.0.1").unwrap(),
            ports: PortSet::parse(ports).unwrap(),
            technique: ScanTechnique::Connect,
            timing: TimingProfile::Normal,
            policy: TimingProfile::Normal.policy_for(ScanTechnique::Connect, 4),
            flags: ScanFlags::default(),
        })
    }

    fn outcome(port: u16, status: PortStatus) -> ProbeOutcome {
        ProbeOutcome::new(Port::new(port).unwrap(), status, Duration::from_millis(1))
    }

    #[test]
    fn test_progress_percent_floors() {
        let snapshot = ProgressSnapshot::compute(1, 3, Duration::from_secs(2));
        assert_eq!(snapshot.percent, 33);
        assert_eq!(snapshot.rate, 0.5);
        assert_eq!(ProgressSnapshot::compute(3, 3, Duration::ZERO).percent, 100);
        assert_eq!(ProgressSnapshot::compute(0, 3, Duration::ZERO).rate, 0.0);
    }

    #[test]
    fn test_open_count_excludes_open_filtered() {
        let mut session = ScanSession::new(config("22,53,80"));
        assert!(session.apply(outcome(22, PortStatus::Open)));
        assert!(session.apply(outcome(53, PortStatus::OpenFiltered)));
        assert!(session.apply(outcome(80, PortStatus::Closed)));

        assert_eq!(session.completed(), 3);
        assert_eq!(session.open_count(), 1);
        assert!(session.is_complete());
    }

    #[test]
    fn test_terminal_session_ignores_outcomes() {
        let mut session = ScanSession::new(config("1-10"));
        session.apply(outcome(1, PortStatus::Closed));
        session.finish(true);

        assert!(!session.apply(outcome(2, PortStatus::Open)));
        assert_eq!(session.completed(), 1);
        assert_eq!(session.open_count(), 0);
        assert!(session.was_stopped());

        // A second finish does not change how the session ended.
        session.finish(false);
        assert!(session.was_stopped());
    }

    #[test]
    fn test_report_sorts_and_tallies() {
        let mut session = ScanSession::new(config("22,80,443"));
        session.apply(outcome(443, PortStatus::Filtered));
        session.apply(outcome(22, PortStatus::Open));
        session.apply(outcome(80, PortStatus::Error));
        session.finish(false);

        let report = session.report();
        let ports: Vec<u16> = report.outcomes.iter().map(|o| o.port.as_u16()).collect();
        assert_eq!(ports, vec![22, 80, 443]);
        assert_eq!(report.open, 1);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.errors, 1);
        assert!(!report.stopped);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["technique"], "connect");
        assert_eq!(json["timing"], "T3");
    }
}
