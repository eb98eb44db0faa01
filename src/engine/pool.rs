//! Bounded worker pool running one probe task per port.

use crate::engine::stop_requested;
use crate::scanner::{ProbeOutcome, Prober, ScanTechnique};
use crate::types::Port;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, trace};

/// Fixed number of concurrent probe slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerPool {
    capacity: usize,
}

impl WorkerPool {
    /// A pool never has more slots than ports to probe, and always at least one.
    pub(crate) fn new(concurrency: usize, port_count: usize) -> Self {
        Self {
            capacity: concurrency.min(port_count).max(1),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dispatch one task per port and forward each outcome to `outcomes`.
    ///
    /// Dispatch halts as soon as `cancel` flips (or its sender goes away);
    /// tasks already in flight are still drained. Returns how many tasks
    /// were dispatched.
    pub(crate) async fn run(
        self,
        prober: Arc<dyn Prober>,
        ports: Vec<Port>,
        outcomes: mpsc::UnboundedSender<ProbeOutcome>,
        mut cancel: watch::Receiver<bool>,
    ) -> usize {
        let technique = prober.technique();
        let semaphore = Arc::new(Semaphore::new(self.capacity));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, Port> = HashMap::with_capacity(self.capacity);
        let mut dispatched = 0;

        for port in ports {
            let permit = tokio::select! {
                biased;
                _ = stop_requested(&mut cancel) => {
                    debug!(dispatched, "dispatch halted");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let prober = Arc::clone(&prober);
            let handle = tasks.spawn(async move {
                let _permit = permit;
                prober.probe(port).await.with_protocol(technique)
            });
            in_flight.insert(handle.id(), port);
            dispatched += 1;

            while let Some(joined) = tasks.try_join_next_with_id() {
                forward(joined, technique, &mut in_flight, &outcomes);
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            forward(joined, technique, &mut in_flight, &outcomes);
        }

        trace!(dispatched, "worker pool drained");
        dispatched
    }
}

/// Turn a joined task into exactly one outcome for its port.
fn forward(
    joined: Result<(task::Id, ProbeOutcome), JoinError>,
    technique: ScanTechnique,
    in_flight: &mut HashMap<task::Id, Port>,
    outcomes: &mpsc::UnboundedSender<ProbeOutcome>,
) {
    let outcome = match joined {
        Ok((id, outcome)) => {
            in_flight.remove(&id);
            outcome
        }
        Err(e) => {
            let Some(port) = in_flight.remove(&e.id()) else {
                return;
            };
            if !e.is_panic() {
                return;
            }
            error!(%port, "probe task panicked");
            ProbeOutcome::error(port, Duration::ZERO, "probe task panicked")
                .with_protocol(technique)
        }
    };

    // The aggregator may already be gone after a stop.
    let _ = outcomes.send(outcome);
}
