//! Scan engine - orchestrates one scan session at a time.
//!
//! The [`Orchestrator`] validates a [`ScanRequest`], freezes it into a
//! session, then runs two tasks: a dispatcher feeding the bounded
//! [`pool::WorkerPool`], and an aggregator that applies outcomes to the
//! session and publishes [`ScanEvent`]s.
//!
//! ```text
//! Idle --start--> Running --all ports classified / stop--> Completed
//!                    ^                                        |
//!                    +-------------------start----------------+
//! ```

mod aggregator;
pub mod events;
mod pool;
pub mod session;

pub use events::{EventBus, ScanEvent};
pub use session::{ProgressSnapshot, ScanReport, ScanSession, SessionConfig};

use crate::error::ScanResult;
use crate::scanner::{create_prober, ScanTechnique};
use crate::timing::TimingProfile;
use crate::types::{PortSet, ScanId, Target};
use aggregator::Aggregator;
use pool::WorkerPool;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Idle,
    Running,
    Completed,
}

/// Optional work on top of port classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanFlags {
    /// Read banners from open ports.
    pub service_detection: bool,
    /// Fingerprint the OS once the scan completes.
    pub os_detection: bool,
    /// Implies both of the above.
    pub aggressive: bool,
}

impl ScanFlags {
    /// Flags with `aggressive` expanded.
    pub fn effective(self) -> Self {
        if self.aggressive {
            Self {
                service_detection: true,
                os_detection: true,
                aggressive: true,
            }
        } else {
            self
        }
    }
}

/// Unvalidated inputs of a scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: String,
    pub ports: String,
    pub technique: ScanTechnique,
    pub timing: TimingProfile,
    pub flags: ScanFlags,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, ports: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ports: ports.into(),
            technique: ScanTechnique::default(),
            timing: TimingProfile::default(),
            flags: ScanFlags::default(),
        }
    }

    pub fn technique(mut self, technique: ScanTechnique) -> Self {
        self.technique = technique;
        self
    }

    pub fn timing(mut self, timing: TimingProfile) -> Self {
        self.timing = timing;
        self
    }

    pub fn flags(mut self, flags: ScanFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Engine-wide settings, independent of any one scan.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on worker concurrency, whatever the timing tier asks for.
    pub pool_capacity: usize,
    /// How long a stop waits for in-flight probes before aborting them.
    pub stop_grace: Duration,
    pub progress_interval: Duration,
    /// Executable used for OS fingerprinting.
    pub os_tool: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 1024,
            stop_grace: Duration::from_millis(5000),
            progress_interval: Duration::from_millis(250),
            os_tool: "nmap".to_string(),
        }
    }
}

/// Requests a stop of the run that was live when the handle was taken.
///
/// Does not keep that run alive; stopping a finished run is a no-op.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    cancel: Weak<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.upgrade() {
            cancel.send_replace(true);
        }
    }
}

/// Resolves once `cancel` is set, or once every sender is gone.
pub(crate) async fn stop_requested(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

struct RunHandle {
    cancel: Arc<watch::Sender<bool>>,
    dispatcher: JoinHandle<usize>,
    aggregator: JoinHandle<ScanSession>,
}

/// Runs scan sessions, one at a time.
pub struct Orchestrator {
    config: EngineConfig,
    bus: EventBus,
    state: Arc<watch::Sender<ScanState>>,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
    run: Option<RunHandle>,
    last_session: Option<ScanSession>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
            state: Arc::new(watch::channel(ScanState::Idle).0),
            progress: Arc::new(watch::channel(ProgressSnapshot::default()).0),
            run: None,
            last_session: None,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ScanEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Latest progress snapshot of the current or last run.
    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.borrow()
    }

    /// Start a scan.
    ///
    /// Returns `Ok(false)` without side effects if a scan is already running,
    /// and an error if the target or port specification is invalid.
    pub async fn start(&mut self, request: ScanRequest) -> ScanResult<bool> {
        if self.state() == ScanState::Running {
            debug!("scan already running, start ignored");
            return Ok(false);
        }

        let config = match self.freeze(&request) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!(host = %request.target, ports = %request.ports, error = %e, "scan rejected");
                self.bus.emit(ScanEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        // Collect a previous run that nobody waited for.
        if self.run.is_some() {
            self.wait().await;
        }
        self.last_session = None;

        let total = config.ports.len();
        let pool = WorkerPool::new(config.policy.concurrency, total);
        info!(
            scan_id = %config.id.short(),
            host = %config.target,
            technique = %config.technique,
            timing = %config.timing,
            ports = total,
            concurrency = pool.capacity(),
            timeout_ms = config.policy.timeout.as_millis() as u64,
            "scan started"
        );

        self.progress
            .send_replace(ProgressSnapshot::compute(0, total, Duration::ZERO));
        self.state.send_replace(ScanState::Running);
        self.bus.emit(ScanEvent::Started {
            scan_id: config.id,
            target: config.target.clone(),
            technique: config.technique,
            total,
        });

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let prober = create_prober(
            config.technique,
            config.target.clone(),
            config.policy.timeout,
            config.flags.service_detection,
        );
        let ports = config.ports.as_slice().to_vec();
        let dispatcher = tokio::spawn(pool.run(prober, ports, outcome_tx, cancel_rx.clone()));

        let aggregator = Aggregator {
            session: ScanSession::new(Arc::clone(&config)),
            bus: self.bus.clone(),
            state: Arc::clone(&self.state),
            progress: Arc::clone(&self.progress),
            progress_interval: self.config.progress_interval,
            os_tool: self.config.os_tool.clone(),
        };
        let aggregator = tokio::spawn(aggregator.run(outcome_rx, cancel_rx));

        self.run = Some(RunHandle {
            cancel: Arc::new(cancel_tx),
            dispatcher,
            aggregator,
        });
        Ok(true)
    }

    /// Validate a request and fix everything the run will need.
    fn freeze(&self, request: &ScanRequest) -> ScanResult<SessionConfig> {
        let target = Target::parse(&request.target)?;
        let ports = PortSet::parse(&request.ports)?;

        let mut policy = request.timing.policy(request.technique);
        policy.concurrency = policy.concurrency.min(self.config.pool_capacity).max(1);

        Ok(SessionConfig {
            id: ScanId::new(),
            target,
            ports,
            technique: request.technique,
            timing: request.timing,
            policy,
            flags: request.flags.effective(),
        })
    }

    /// Wait for the current run to end and return its session.
    ///
    /// With no run in progress, returns the last finished session.
    pub async fn wait(&mut self) -> Option<ScanSession> {
        let Some(run) = self.run.take() else {
            return self.last_session.clone();
        };

        let session = match run.aggregator.await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "aggregator task failed");
                self.state.send_replace(ScanState::Completed);
                run.dispatcher.abort();
                return None;
            }
        };

        let mut dispatcher = run.dispatcher;
        match timeout(self.config.stop_grace, &mut dispatcher).await {
            Ok(Ok(dispatched)) => debug!(dispatched, "dispatcher finished"),
            Ok(Err(e)) => error!(error = %e, "dispatcher task failed"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.stop_grace.as_millis() as u64,
                    "in-flight probes outlived the grace period, aborting"
                );
                dispatcher.abort();
            }
        }

        self.last_session = Some(session.clone());
        Some(session)
    }

    /// Stop the current run and wait for it to wind down.
    pub async fn stop(&mut self) -> Option<ScanSession> {
        if let Some(run) = &self.run {
            run.cancel.send_replace(true);
        }
        self.wait().await
    }

    /// A handle that can stop the current run from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self
                .run
                .as_ref()
                .map(|run| Arc::downgrade(&run.cancel))
                .unwrap_or_default(),
        }
    }

    /// The last finished session, if any.
    pub fn session(&self) -> Option<&ScanSession> {
        self.last_session.as_ref()
    }

    /// Discard the last session. Has no effect while a scan is running.
    pub fn clear(&mut self) {
        if self.state() == ScanState::Running {
            return;
        }
        self.last_session = None;
        self.state.send_replace(ScanState::Idle);
        self.progress.send_replace(ProgressSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::osfp::{FingerprintSource, DETECTION_FAILED};
    use crate::scanner::PortStatus;
    use std::collections::HashSet;
    use tokio::net::TcpListener;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    /// Bind `n` loopback listeners and return them with a port spec naming them.
    async fn listeners(n: usize) -> (Vec<TcpListener>, String) {
        let mut bound = Vec::with_capacity(n);
        let mut spec = Vec::with_capacity(n);
        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            spec.push(listener.local_addr().unwrap().port().to_string());
            bound.push(listener);
        }
        (bound, spec.join(","))
    }

    #[test]
    fn test_aggressive_implies_detection() {
        let flags = ScanFlags {
            aggressive: true,
            ..ScanFlags::default()
        }
        .effective();
        assert!(flags.service_detection && flags.os_detection);
        assert_eq!(ScanFlags::default().effective(), ScanFlags::default());
    }

    #[tokio::test]
    async fn test_invalid_inputs_are_rejected_before_start() {
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        let mut events = orchestrator.subscribe();

        let bad_target = orchestrator
            .start(ScanRequest::new("999.1.1.1", "80"))
            .await;
        assert!(matches!(bad_target, Err(ScanError::InvalidTarget(_))));

        let bad_ports = orchestrator
            .start(ScanRequest::new("127.0.0.1", "70000,abc"))
            .await;
        assert!(matches!(bad_ports, Err(ScanError::InvalidPortSpec(_))));

        assert_eq!(orchestrator.state(), ScanState::Idle);
        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ScanEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_every_port_reported_exactly_once() {
        for timing in [TimingProfile::Paranoid, TimingProfile::Insane] {
            let mut orchestrator = Orchestrator::new(EngineConfig::default());
            let request = ScanRequest::new("127.0.0.1", "1-50").timing(timing);

            assert!(orchestrator.start(request).await.unwrap());
            let session = orchestrator.wait().await.unwrap();

            assert_eq!(session.completed(), 50);
            assert_eq!(session.outcomes().len(), 50);
            let unique: HashSet<u16> = session
                .outcomes()
                .iter()
                .map(|o| o.port.as_u16())
                .collect();
            assert_eq!(unique.len(), 50);
            assert_eq!(orchestrator.state(), ScanState::Completed);
            assert_eq!(orchestrator.progress().percent, 100);
        }
    }

    #[tokio::test]
    async fn test_unresolvable_host_reports_error_per_port() {
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        let mut events = orchestrator.subscribe();

        let request = ScanRequest::new("nonexistent-host.invalid", "1-5");
        assert!(orchestrator.start(request).await.unwrap());
        let session = orchestrator.wait().await.unwrap();

        assert_eq!(session.completed(), 5);
        assert!(!session.was_stopped());
        assert!(session
            .outcomes()
            .iter()
            .all(|o| o.status == PortStatus::Error && o.detail.is_some()));

        let events = drain(&mut events);
        let errors = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::Error(_)))
            .count();
        assert_eq!(errors, 5);
        assert!(matches!(
            events.last(),
            Some(ScanEvent::Finished { stopped: false, completed: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_pool_capacity_caps_concurrency() {
        let config = EngineConfig {
            pool_capacity: 4,
            ..EngineConfig::default()
        };
        let mut orchestrator = Orchestrator::new(config);
        let request = ScanRequest::new("127.0.0.1", "1-20").timing(TimingProfile::Insane);

        orchestrator.start(request).await.unwrap();
        let session = orchestrator.wait().await.unwrap();
        assert!(session.config().policy.concurrency <= 4);
        assert_eq!(session.completed(), 20);
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (_bound, spec) = listeners(3).await;
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        let mut events = orchestrator.subscribe();

        let request = ScanRequest::new("127.0.0.1", format!("{},1-17", spec))
            .timing(TimingProfile::Aggressive);
        orchestrator.start(request).await.unwrap();
        let session = orchestrator.wait().await.unwrap();
        assert_eq!(session.total(), 20);
        assert!(session.open_count() >= 3);

        let events = drain(&mut events);
        assert!(matches!(
            events.first(),
            Some(ScanEvent::Started { total: 20, .. })
        ));
        let outcomes = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::Outcome(_)))
            .count();
        assert_eq!(outcomes, 20);

        let n = events.len();
        assert!(matches!(
            events[n - 1],
            ScanEvent::Finished {
                completed: 20,
                total: 20,
                stopped: false,
                ..
            }
        ));
        match &events[n - 2] {
            ScanEvent::Progress(snapshot) => assert_eq!(snapshot.percent, 100),
            other => panic!("expected final progress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_while_running_is_ignored() {
        let (_bound, spec) = listeners(5).await;
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        let flags = ScanFlags {
            service_detection: true,
            ..ScanFlags::default()
        };
        let request = ScanRequest::new("127.0.0.1", spec)
            .timing(TimingProfile::Paranoid)
            .flags(flags);

        assert!(orchestrator.start(request.clone()).await.unwrap());
        assert_eq!(orchestrator.state(), ScanState::Running);
        assert!(!orchestrator.start(request).await.unwrap());

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state(), ScanState::Completed);
    }

    #[tokio::test]
    async fn test_stop_freezes_completed_count() {
        // Each open port waits ~500ms for a banner that never comes, and
        // T0 probes one port at a time.
        let (_bound, spec) = listeners(20).await;
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        let mut events = orchestrator.subscribe();
        let flags = ScanFlags {
            service_detection: true,
            ..ScanFlags::default()
        };
        let request = ScanRequest::new("127.0.0.1", spec)
            .timing(TimingProfile::Paranoid)
            .flags(flags);

        orchestrator.start(request).await.unwrap();
        let handle = orchestrator.stop_handle();
        tokio::time::sleep(Duration::from_millis(700)).await;
        handle.stop();
        let session = orchestrator.wait().await.unwrap();

        assert!(session.was_stopped());
        assert!(session.completed() < 20);
        assert_eq!(session.outcomes().len(), session.completed());
        assert_eq!(orchestrator.state(), ScanState::Completed);

        let events = drain(&mut events);
        let finished_at = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Finished { stopped: true, .. }))
            .unwrap();
        assert!(events[finished_at..]
            .iter()
            .all(|e| !matches!(e, ScanEvent::Outcome(_))));
        let delivered = events[..finished_at]
            .iter()
            .filter(|e| matches!(e, ScanEvent::Outcome(_)))
            .count();
        assert_eq!(delivered, session.completed());

        // The stopped run is gone; its handle does nothing now.
        handle.stop();
    }

    #[tokio::test]
    async fn test_session_is_kept_until_cleared() {
        let mut orchestrator = Orchestrator::new(EngineConfig::default());
        assert!(orchestrator.session().is_none());

        orchestrator
            .start(ScanRequest::new("127.0.0.1", "1-5"))
            .await
            .unwrap();
        orchestrator.wait().await.unwrap();
        assert_eq!(orchestrator.session().map(|s| s.completed()), Some(5));

        // Waiting again returns the same session.
        assert_eq!(orchestrator.wait().await.map(|s| s.total()), Some(5));

        orchestrator.clear();
        assert!(orchestrator.session().is_none());
        assert_eq!(orchestrator.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_os_detection_runs_once_after_completion() {
        let (_bound, spec) = listeners(1).await;
        let config = EngineConfig {
            os_tool: "/nonexistent/cyberscan-osfp-tool".to_string(),
            ..EngineConfig::default()
        };
        let mut orchestrator = Orchestrator::new(config);
        let mut events = orchestrator.subscribe();
        let flags = ScanFlags {
            os_detection: true,
            ..ScanFlags::default()
        };

        orchestrator
            .start(ScanRequest::new("127.0.0.1", spec).flags(flags))
            .await
            .unwrap();
        let session = orchestrator.wait().await.unwrap();
        assert_eq!(session.outcomes()[0].status, PortStatus::Open);

        let fingerprint = loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let ScanEvent::OsFingerprint(fp) = event {
                break fp;
            }
        };
        assert_eq!(fingerprint.source, FingerprintSource::Unavailable);
        assert_eq!(fingerprint.output, DETECTION_FAILED);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, ScanEvent::OsFingerprint(_))));
    }
}
