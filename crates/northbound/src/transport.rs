//! Host-facing export transport and its lifecycle.
//!
//! `ExportTransport` owns the bounded delivery queue and the dedup worker.
//!
//! ```text
//! host ──deliver──▶ DeliveryEngine ──retry──▶ Sender (event channel)
//!                        │                       ▲
//!                        ▼ queue (bounded)       │
//!                   dedup worker ──▶ Notifier ───┘ (new-device channel)
//! ```

use crate::contract::{AckHandle, Marshaller, Notifier, Sender, TransportCleanup};
use crate::dedup::{run_dedup_worker, KnownDevices};
use crate::delivery::DeliveryEngine;
use crate::error::{ExportError, ExportResult};
use crate::model::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Lifecycle of an [`ExportTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting events; the dedup worker is running.
    Running,
    /// Queue closed; waiting for the worker to drain.
    Draining,
    /// Worker exited and transport released.
    Stopped,
}

/// Tunables for the export core.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Wait between failed event sends.
    pub send_failure_wait: Duration,
    /// Capacity of the dedup queue.
    pub queue_capacity: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            send_failure_wait: Duration::from_secs(1),
            queue_capacity: 16,
        }
    }
}

/// Event and device-metadata export adapter.
pub struct ExportTransport {
    engine: DeliveryEngine,
    events: Option<mpsc::Sender<Event>>,
    worker: Option<JoinHandle<KnownDevices>>,
    cleanup: Arc<dyn TransportCleanup>,
    state: LifecycleState,
    known_devices: Option<KnownDevices>,
}

impl ExportTransport {
    /// Create the transport and start its dedup worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        settings: TransportSettings,
        sender: Arc<dyn Sender>,
        notifier: Arc<dyn Notifier>,
        marshaller: Arc<dyn Marshaller>,
        cleanup: Arc<dyn TransportCleanup>,
    ) -> Self {
        let (events, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let worker = tokio::spawn(run_dedup_worker(receiver, notifier));

        info!(
            queue_capacity = settings.queue_capacity,
            send_failure_wait_ms = settings.send_failure_wait.as_millis() as u64,
            "Export transport running"
        );

        Self {
            engine: DeliveryEngine::new(sender, marshaller, settings.send_failure_wait),
            events: Some(events),
            worker: Some(worker),
            cleanup,
            state: LifecycleState::Running,
            known_devices: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Final known-devices set, available once stopped.
    pub fn known_devices(&self) -> Option<&KnownDevices> {
        self.known_devices.as_ref()
    }

    /// Deliver a batch of events in order.
    ///
    /// Each event is queued for device dedup and then sent until the sender
    /// accepts it. Always asks the host to continue and hands the batch back
    /// for downstream stages.
    pub async fn deliver(&self, ack: &dyn AckHandle, events: Vec<Event>) -> (bool, Vec<Event>) {
        for event in &events {
            self.enqueue(event).await;
            self.engine.handle_event(ack, event).await;
        }

        (true, events)
    }

    async fn enqueue(&self, event: &Event) {
        let Some(queue) = &self.events else {
            error!(event_id = %event.id, "Event delivered after shutdown; skipping device check");
            return;
        };

        // Blocks while the queue is full.
        if queue.send(event.clone()).await.is_err() {
            error!(event_id = %event.id, "Dedup worker is gone; skipping device check");
        }
    }

    /// Close the queue, wait for the dedup worker to drain, then release the
    /// transport.
    ///
    /// Calling it again after it returned is a no-op. If the returned future
    /// is dropped before completion, the next call resumes the drain.
    pub async fn shutdown(&mut self) -> ExportResult<()> {
        if self.state == LifecycleState::Stopped {
            debug!("Export transport already stopped");
            return Ok(());
        }

        self.state = LifecycleState::Draining;
        info!("Export transport draining");
        drop(self.events.take());

        // The handle stays in place until the join completes, so a cancelled
        // call leaves it for the next one.
        let joined = match self.worker.as_mut() {
            Some(worker) => {
                let joined = worker.await;
                self.worker = None;
                joined
            }
            None => Ok(KnownDevices::default()),
        };

        self.state = LifecycleState::Stopped;
        let result = match joined {
            Ok(known) => {
                info!(known_devices = known.len(), "Export transport stopped");
                self.known_devices = Some(known);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Dedup worker failed");
                Err(ExportError::Worker(e.to_string()))
            }
        };

        self.cleanup.clean_up().await;
        result
    }
}
