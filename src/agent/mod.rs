// Agent side: samples process metrics on one timer and ships them on another.
// Producer and dispatcher share only the bounded queue and the registration state.

pub mod dispatcher;
pub mod producer;
pub mod queue;
pub mod registration;
pub mod sources;
pub mod status;
pub mod transport;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, interval};

pub use dispatcher::{BatchDispatcher, DispatchOutcome, DispatcherConfig};
pub use producer::{DEFAULT_COLLECT_TIMEOUT, MetricProducer, ProduceOutcome};
pub use queue::{BoundedQueue, BoundedSampleQueue};
pub use registration::RegistrationState;
pub use status::{ConnectionStatus, ConnectionStatusMonitor, StatusListener};
pub use transport::{MetricsClient, TransportChannel, TransportError};

/// Agent timing and logging config.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub collect_interval_ms: u64,
    pub send_interval_ms: u64,
    /// How often to log agent stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Runs `producer.tick()` on the collect interval until shutdown.
pub fn spawn_producer(
    producer: Arc<MetricProducer>,
    config: &AgentLoopConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let collect_interval = Duration::from_millis(config.collect_interval_ms.max(1));
    tokio::spawn(async move {
        let mut tick = interval(collect_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    producer.tick().await;
                }
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Metric producer shutting down");
                    break;
                }
            }
        }
    })
}

/// Runs `dispatcher.tick()` on the send interval and logs agent stats periodically.
/// Exits on shutdown without a final send; queued samples are abandoned.
pub fn spawn_dispatcher(
    dispatcher: Arc<BatchDispatcher>,
    producer: Arc<MetricProducer>,
    queue: Arc<BoundedSampleQueue>,
    config: &AgentLoopConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let send_interval = Duration::from_millis(config.send_interval_ms.max(1));
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs.max(1));
    tokio::spawn(async move {
        let mut tick = interval(send_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    dispatcher.tick().await;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        status = %dispatcher.status(),
                        queued = queue.len(),
                        evicted_total = queue.evicted_total(),
                        produced_total = producer.produced_total(),
                        skipped_total = producer.skipped_total(),
                        batches_sent_total = dispatcher.batches_sent_total(),
                        samples_sent_total = dispatcher.samples_sent_total(),
                        send_failures_total = dispatcher.send_failures_total(),
                        discarded_total = dispatcher.discarded_total(),
                        client_rebuilds_total = dispatcher.client_rebuilds_total(),
                        "agent stats"
                    );
                }
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Batch dispatcher shutting down");
                    break;
                }
            }
        }
    })
}
