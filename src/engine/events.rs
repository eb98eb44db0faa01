//! Events published by the engine.
//!
//! Subscribers get their own unbounded channel, so a slow consumer never
//! drops events or stalls the aggregator.

use crate::engine::session::ProgressSnapshot;
use crate::osfp::OsFingerprint;
use crate::scanner::{ProbeOutcome, ScanTechnique};
use crate::types::{ScanId, Target};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Everything a display, logger or exporter can observe about a run.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A run was accepted and is about to dispatch `total` probes.
    Started {
        scan_id: ScanId,
        target: Target,
        technique: ScanTechnique,
        total: usize,
    },
    /// Periodic progress, plus one final snapshot at completion.
    Progress(ProgressSnapshot),
    /// One port was classified.
    Outcome(ProbeOutcome),
    /// The run left `Running`.
    Finished {
        completed: usize,
        total: usize,
        open: usize,
        stopped: bool,
        elapsed_ms: u64,
    },
    /// A rejected start or a probe that could not be carried out.
    Error(String),
    /// Result of the OS fingerprint delegate.
    OsFingerprint(OsFingerprint),
}

/// Fan-out of events to any number of subscribers.
///
/// Cloning yields a handle to the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ScanEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It sees every event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ScanEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, pruning closed ones.
    pub fn emit(&self, event: ScanEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ScanEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
