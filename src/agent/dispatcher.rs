// Drains the sample queue once per tick and sends it as one batch while connected.
// Delivery is best-effort: a failed batch is logged and dropped, never requeued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{error, warn};

use super::queue::BoundedSampleQueue;
use super::registration::RegistrationState;
use super::status::{AtomicStatus, ConnectionStatus, ConnectionStatusMonitor, StatusListener};
use super::transport::{MetricsClient, TransportChannel, TransportError};
use crate::models::MetricBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotRegistered,
    /// Status was not `Connected`; nothing was sent.
    NotConnected,
    /// Connected but the queue was empty.
    Empty,
    Sent(usize),
    /// The batch was dropped after a send error or timeout.
    Failed,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on one outbound call; keeps a hung call from spanning ticks.
    pub send_timeout: Duration,
    /// Drain and drop queued samples on ticks spent disconnected instead of retaining
    /// the most recent `buffer_size` for the next connection.
    pub discard_while_disconnected: bool,
}

pub struct BatchDispatcher {
    queue: Arc<BoundedSampleQueue>,
    registration: Arc<RegistrationState>,
    channel: Arc<dyn TransportChannel>,
    config: DispatcherConfig,
    status: AtomicStatus,
    client: RwLock<Option<Arc<dyn MetricsClient>>>,
    batches_sent_total: AtomicU64,
    samples_sent_total: AtomicU64,
    send_failures_total: AtomicU64,
    discarded_total: AtomicU64,
    client_rebuilds_total: AtomicU64,
}

impl BatchDispatcher {
    pub fn new(
        queue: Arc<BoundedSampleQueue>,
        registration: Arc<RegistrationState>,
        channel: Arc<dyn TransportChannel>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            registration,
            channel,
            config,
            status: AtomicStatus::new(ConnectionStatus::Disconnected),
            client: RwLock::new(None),
            batches_sent_total: AtomicU64::new(0),
            samples_sent_total: AtomicU64::new(0),
            send_failures_total: AtomicU64::new(0),
            discarded_total: AtomicU64::new(0),
            client_rebuilds_total: AtomicU64::new(0),
        }
    }

    /// Registers as a listener and adopts the monitor's current status.
    pub fn attach(self: &Arc<Self>, monitor: &ConnectionStatusMonitor) {
        monitor.add_listener(self.clone());
        let current = monitor.status();
        if current != self.status.load() {
            self.status_changed(current);
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.load()
    }

    fn current_client(&self) -> Option<Arc<dyn MetricsClient>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn tick(&self) -> DispatchOutcome {
        let instance_id = match self.registration.instance_id() {
            Some(id) if self.registration.is_registered() => id,
            _ => return DispatchOutcome::NotRegistered,
        };

        if self.status.load() != ConnectionStatus::Connected {
            if self.config.discard_while_disconnected {
                let dropped = self.queue.drain_all().len();
                self.discarded_total
                    .fetch_add(dropped as u64, Ordering::Relaxed);
            }
            return DispatchOutcome::NotConnected;
        }

        let metrics = self.queue.drain_all();
        if metrics.is_empty() {
            return DispatchOutcome::Empty;
        }
        let samples = metrics.len();

        let Some(client) = self.current_client() else {
            warn!(
                operation = "send_batch",
                samples, "connected without a client handle; batch dropped"
            );
            self.send_failures_total.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Failed;
        };

        let batch = MetricBatch {
            application_instance_id: instance_id,
            metrics,
        };
        let timeout_ms = self.config.send_timeout.as_millis() as u64;
        let result = match tokio::time::timeout(self.config.send_timeout, client.collect(batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout_ms)),
        };

        match result {
            Ok(()) => {
                self.batches_sent_total.fetch_add(1, Ordering::Relaxed);
                self.samples_sent_total
                    .fetch_add(samples as u64, Ordering::Relaxed);
                DispatchOutcome::Sent(samples)
            }
            Err(e) => {
                error!(
                    error = %e,
                    operation = "send_batch",
                    samples,
                    "send metrics to collector failed"
                );
                self.send_failures_total.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Failed
            }
        }
    }

    pub fn batches_sent_total(&self) -> u64 {
        self.batches_sent_total.load(Ordering::Relaxed)
    }

    pub fn samples_sent_total(&self) -> u64 {
        self.samples_sent_total.load(Ordering::Relaxed)
    }

    pub fn send_failures_total(&self) -> u64 {
        self.send_failures_total.load(Ordering::Relaxed)
    }

    pub fn discarded_total(&self) -> u64 {
        self.discarded_total.load(Ordering::Relaxed)
    }

    pub fn client_rebuilds_total(&self) -> u64 {
        self.client_rebuilds_total.load(Ordering::Relaxed)
    }
}

impl StatusListener for BatchDispatcher {
    fn status_changed(&self, status: ConnectionStatus) {
        if status == ConnectionStatus::Connected {
            match self.channel.client() {
                Ok(client) => {
                    *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
                    self.client_rebuilds_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, operation = "build_client", "could not bind metrics client");
                }
            }
        }
        self.status.store(status);
    }
}
