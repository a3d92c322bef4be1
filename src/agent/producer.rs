// Builds one metric sample per tick and offers it to the bounded queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::warn;

use super::queue::BoundedSampleQueue;
use super::registration::RegistrationState;
use super::sources::MeasurementSources;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// Registration has not completed yet.
    NotRegistered,
    /// A source failed or overran the collect timeout; nothing was queued this tick.
    Skipped,
    Produced,
}

/// Default bound on one measurement read; matches the default collect interval.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(1);

pub struct MetricProducer {
    queue: Arc<BoundedSampleQueue>,
    registration: Arc<RegistrationState>,
    sources: MeasurementSources,
    collect_timeout: Duration,
    produced_total: AtomicU64,
    skipped_total: AtomicU64,
}

impl MetricProducer {
    pub fn new(
        queue: Arc<BoundedSampleQueue>,
        registration: Arc<RegistrationState>,
        sources: MeasurementSources,
    ) -> Self {
        Self {
            queue,
            registration,
            sources,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            produced_total: AtomicU64::new(0),
            skipped_total: AtomicU64::new(0),
        }
    }

    pub fn with_collect_timeout(mut self, collect_timeout: Duration) -> Self {
        self.collect_timeout = collect_timeout;
        self
    }

    pub async fn tick(&self) -> ProduceOutcome {
        if !self.registration.is_registered() {
            return ProduceOutcome::NotRegistered;
        }
        let time = chrono::Utc::now().timestamp_millis();
        let sources = self.sources.clone();
        // Sources are blocking and may panic or hang; each outcome only costs this tick.
        // A hung read keeps its blocking thread; the tick still returns.
        let read = tokio::task::spawn_blocking(move || sources.sample(time));
        let sample = match tokio::time::timeout(self.collect_timeout, read).await {
            Ok(Ok(Ok(sample))) => sample,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, operation = "collect_sample", "collect metrics failed");
                self.skipped_total.fetch_add(1, Ordering::Relaxed);
                return ProduceOutcome::Skipped;
            }
            Ok(Err(e)) => {
                warn!(error = %e, operation = "collect_sample", "measurement task failed");
                self.skipped_total.fetch_add(1, Ordering::Relaxed);
                return ProduceOutcome::Skipped;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.collect_timeout.as_millis() as u64,
                    operation = "collect_sample",
                    "collect metrics timed out"
                );
                self.skipped_total.fetch_add(1, Ordering::Relaxed);
                return ProduceOutcome::Skipped;
            }
        };
        self.queue.offer(sample);
        self.produced_total.fetch_add(1, Ordering::Relaxed);
        ProduceOutcome::Produced
    }

    pub fn produced_total(&self) -> u64 {
        self.produced_total.load(Ordering::Relaxed)
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped_total.load(Ordering::Relaxed)
    }
}
