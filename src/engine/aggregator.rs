//! Result aggregation.
//!
//! The aggregator task owns the live [`ScanSession`]. Probe outcomes reach
//! it through a single channel, so every mutation of the session happens on
//! one task, in arrival order.

use crate::engine::events::{EventBus, ScanEvent};
use crate::engine::session::{ProgressSnapshot, ScanSession};
use crate::engine::{stop_requested, ScanState};
use crate::osfp;
use crate::scanner::{PortStatus, ProbeOutcome};
use crate::types::Port;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub(crate) struct Aggregator {
    pub(crate) session: ScanSession,
    pub(crate) bus: EventBus,
    pub(crate) state: Arc<watch::Sender<ScanState>>,
    pub(crate) progress: Arc<watch::Sender<ProgressSnapshot>>,
    pub(crate) progress_interval: Duration,
    pub(crate) os_tool: String,
}

impl Aggregator {
    /// Apply outcomes until every port is classified or a stop arrives.
    ///
    /// Outcomes still queued when a stop is seen are discarded.
    pub(crate) async fn run(
        mut self,
        mut outcomes: mpsc::UnboundedReceiver<ProbeOutcome>,
        mut cancel: watch::Receiver<bool>,
    ) -> ScanSession {
        let mut ticker = interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        let stopped = loop {
            if self.session.is_complete() {
                break false;
            }

            tokio::select! {
                biased;
                _ = stop_requested(&mut cancel) => break true,
                received = outcomes.recv() => match received {
                    Some(outcome) => self.record(outcome),
                    // Dispatch ended short of the port count.
                    None => break true,
                },
                _ = ticker.tick() => {
                    self.publish_progress();
                }
            }
        };

        drop(outcomes);
        self.finish(stopped);
        self.session
    }

    fn record(&mut self, outcome: ProbeOutcome) {
        debug!(
            scan_id = %self.session.id().short(),
            port = %outcome.port,
            status = %outcome.status,
            elapsed_ms = outcome.response_time_ms,
            "outcome"
        );

        let failure = (outcome.status == PortStatus::Error).then(|| {
            format!(
                "port {}: {}",
                outcome.port,
                outcome.detail.as_deref().unwrap_or("probe failed")
            )
        });

        if self.session.apply(outcome.clone()) {
            self.bus.emit(ScanEvent::Outcome(outcome));
            if let Some(message) = failure {
                self.bus.emit(ScanEvent::Error(message));
            }
        }
    }

    fn publish_progress(&self) -> ProgressSnapshot {
        let snapshot = self.session.progress();
        self.progress.send_replace(snapshot);
        self.bus.emit(ScanEvent::Progress(snapshot));
        snapshot
    }

    fn finish(&mut self, stopped: bool) {
        self.session.finish(stopped);
        self.state.send_replace(ScanState::Completed);

        let snapshot = self.publish_progress();
        let elapsed_ms = self.session.elapsed().as_millis() as u64;
        let scan_id = self.session.id().short();

        if stopped {
            warn!(
                %scan_id,
                completed = snapshot.completed,
                total = snapshot.total,
                "scan stopped"
            );
        } else {
            info!(
                %scan_id,
                open = self.session.open_count(),
                total = snapshot.total,
                elapsed_ms,
                "scan completed"
            );
        }

        self.bus.emit(ScanEvent::Finished {
            completed: snapshot.completed,
            total: snapshot.total,
            open: self.session.open_count(),
            stopped,
            elapsed_ms,
        });

        if !stopped && self.session.config().flags.os_detection {
            self.spawn_os_fingerprint();
        }
    }

    /// Fire-and-forget: the result arrives later as an event.
    fn spawn_os_fingerprint(&self) {
        let config = Arc::clone(self.session.config());
        let bus = self.bus.clone();
        let tool = self.os_tool.clone();
        let open: Vec<Port> = self
            .session
            .outcomes()
            .iter()
            .filter(|o| o.is_open())
            .map(|o| o.port)
            .collect();

        tokio::spawn(async move {
            let fingerprint = osfp::fingerprint(&tool, &config, &open).await;
            bus.emit(ScanEvent::OsFingerprint(fingerprint));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::SessionConfig;
    use crate::engine::ScanFlags;
    use crate::scanner::ScanTechnique;
    use crate::timing::TimingProfile;
    use crate::types::{PortSet, ScanId, Target};

    fn aggregator(ports: &str, bus: &EventBus) -> Aggregator {
        let config = Arc::new(SessionConfig {
            id: ScanId::new(),
            target: Target::parse("127.0.0.1").unwrap(),
            ports: PortSet::parse(ports).unwrap(),
            technique: ScanTechnique::Connect,
            timing: TimingProfile::Normal,
            policy: TimingProfile::Normal.policy_for(ScanTechnique::Connect, 2),
            flags: ScanFlags::default(),
        });
        Aggregator {
            session: ScanSession::new(config),
            bus: bus.clone(),
            state: Arc::new(watch::channel(ScanState::Running).0),
            progress: Arc::new(watch::channel(ProgressSnapshot::default()).0),
            progress_interval: Duration::from_millis(250),
            os_tool: "nmap".to_string(),
        }
    }

    fn outcome(port: u16, status: PortStatus) -> ProbeOutcome {
        ProbeOutcome::new(Port::new(port).unwrap(), status, Duration::from_millis(1))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_completes_when_all_ports_reported() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let agg = aggregator("1-3", &bus);
        let state = Arc::clone(&agg.state);

        let (tx, rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        tx.send(outcome(1, PortStatus::Open)).unwrap();
        tx.send(outcome(2, PortStatus::Closed)).unwrap();
        tx.send(outcome(3, PortStatus::Error)).unwrap();

        let session = agg.run(rx, cancel_rx).await;
        assert_eq!(session.completed(), 3);
        assert_eq!(session.open_count(), 1);
        assert!(!session.was_stopped());
        assert_eq!(*state.borrow(), ScanState::Completed);

        let events = drain(&mut events);
        let errors = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::Error(m) if m.starts_with("port 3:")))
            .count();
        assert_eq!(errors, 1);
        match events.last() {
            Some(ScanEvent::Finished {
                completed, stopped, ..
            }) => {
                assert_eq!(*completed, 3);
                assert!(!stopped);
            }
            other => panic!("expected Finished last, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_discards_queued_outcomes() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let agg = aggregator("1-10", &bus);

        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();
        tx.send(outcome(1, PortStatus::Open)).unwrap();

        let session = agg.run(rx, cancel_rx).await;
        assert_eq!(session.completed(), 0);
        assert!(session.was_stopped());
        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, ScanEvent::Outcome(_))));
    }

    #[tokio::test]
    async fn test_publishes_periodic_progress() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let mut agg = aggregator("1-2", &bus);
        agg.progress_interval = Duration::from_millis(20);
        let progress = Arc::clone(&agg.progress);

        let (tx, rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = tokio::spawn(agg.run(rx, cancel_rx));

        tx.send(outcome(1, PortStatus::Closed)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(progress.borrow().percent, 50);

        tx.send(outcome(2, PortStatus::Closed)).unwrap();
        let session = run.await.unwrap();
        assert_eq!(session.progress().percent, 100);

        let ticks = drain(&mut events)
            .iter()
            .filter(|e| matches!(e, ScanEvent::Progress(_)))
            .count();
        assert!(ticks >= 2);
    }
}
