// BatchDispatcher tests with a fake transport: connection gating, client rebuilds,
// best-effort failure handling, disconnected-queue policy

mod common;

use apm_telemetry::agent::{
    BatchDispatcher, BoundedSampleQueue, ConnectionStatus, ConnectionStatusMonitor,
    DispatchOutcome, DispatcherConfig, MetricsClient, RegistrationState, TransportChannel,
    TransportError,
};
use apm_telemetry::models::MetricBatch;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<MetricBatch>>,
    fail_sends: AtomicBool,
    hang_sends: AtomicBool,
    fail_builds: AtomicBool,
    builds: AtomicUsize,
}

struct FakeChannel {
    wire: Arc<Wire>,
}

struct FakeClient {
    wire: Arc<Wire>,
}

impl TransportChannel for FakeChannel {
    fn client(&self) -> Result<Arc<dyn MetricsClient>, TransportError> {
        if self.wire.fail_builds.load(Ordering::Relaxed) {
            return Err(TransportError::NotConnected);
        }
        self.wire.builds.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(FakeClient {
            wire: self.wire.clone(),
        }))
    }
}

impl MetricsClient for FakeClient {
    fn collect(&self, batch: MetricBatch) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.wire.hang_sends.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.wire.fail_sends.load(Ordering::Relaxed) {
                return Err(TransportError::Rejected("collector unavailable".into()));
            }
            self.wire.sent.lock().unwrap().push(batch);
            Ok(())
        })
    }
}

struct Harness {
    wire: Arc<Wire>,
    queue: Arc<BoundedSampleQueue>,
    registration: Arc<RegistrationState>,
    monitor: ConnectionStatusMonitor,
    dispatcher: Arc<BatchDispatcher>,
}

fn harness(discard_while_disconnected: bool) -> Harness {
    let wire = Arc::new(Wire::default());
    let queue = Arc::new(BoundedSampleQueue::new(600));
    let registration = Arc::new(RegistrationState::new());
    registration.set_application_id(1);
    registration.set_instance_id(7);
    let monitor = ConnectionStatusMonitor::new();
    let dispatcher = Arc::new(BatchDispatcher::new(
        queue.clone(),
        registration.clone(),
        Arc::new(FakeChannel { wire: wire.clone() }),
        DispatcherConfig {
            send_timeout: Duration::from_millis(800),
            discard_while_disconnected,
        },
    ));
    dispatcher.attach(&monitor);
    Harness {
        wire,
        queue,
        registration,
        monitor,
        dispatcher,
    }
}

fn enqueue(h: &Harness, n: i64) {
    for i in 0..n {
        h.queue.offer(common::sample(common::T_12_30 + i * 1000));
    }
}

fn sent_count(h: &Harness) -> usize {
    h.wire.sent.lock().unwrap().len()
}

#[tokio::test]
async fn dispatcher_sends_only_while_connected_and_rebuilds_per_connect() {
    let h = harness(false);
    enqueue(&h, 3);

    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::NotConnected);
    h.monitor.transition(ConnectionStatus::Connecting);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::NotConnected);
    assert_eq!(sent_count(&h), 0);
    assert_eq!(h.queue.len(), 3, "samples retained while not connected");

    h.monitor.transition(ConnectionStatus::Connected);
    assert_eq!(h.dispatcher.client_rebuilds_total(), 1);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Sent(3));

    h.monitor.transition(ConnectionStatus::Disconnected);
    enqueue(&h, 2);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::NotConnected);
    assert_eq!(sent_count(&h), 1);

    h.monitor.transition(ConnectionStatus::Connected);
    assert_eq!(h.dispatcher.client_rebuilds_total(), 2);
    assert_eq!(h.wire.builds.load(Ordering::Relaxed), 2);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Sent(2));

    let sent = h.wire.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].application_instance_id, 7);
    assert_eq!(sent[0].metrics.len(), 3);
    assert_eq!(sent[1].metrics.len(), 2);
}

#[tokio::test]
async fn dispatcher_batch_keeps_queue_order() {
    let h = harness(false);
    h.monitor.transition(ConnectionStatus::Connected);
    enqueue(&h, 4);
    h.dispatcher.tick().await;
    let sent = h.wire.sent.lock().unwrap();
    let times: Vec<i64> = sent[0].metrics.iter().map(|m| m.time).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
}

#[tokio::test]
async fn dispatcher_skips_empty_queue() {
    let h = harness(false);
    h.monitor.transition(ConnectionStatus::Connected);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Empty);
    assert_eq!(sent_count(&h), 0);
}

#[tokio::test]
async fn dispatcher_waits_for_registration() {
    let h = harness(false);
    h.registration.set_instance_id(0);
    h.monitor.transition(ConnectionStatus::Connected);
    enqueue(&h, 2);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::NotRegistered);
    assert_eq!(h.queue.len(), 2);
}

#[tokio::test]
async fn dispatcher_drops_batch_on_send_failure() {
    let h = harness(false);
    h.monitor.transition(ConnectionStatus::Connected);
    h.wire.fail_sends.store(true, Ordering::Relaxed);
    enqueue(&h, 5);

    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Failed);
    assert!(h.queue.is_empty(), "failed batch is not requeued");
    assert_eq!(h.dispatcher.send_failures_total(), 1);

    h.wire.fail_sends.store(false, Ordering::Relaxed);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Empty);
}

#[tokio::test(start_paused = true)]
async fn dispatcher_times_out_hung_send() {
    let h = harness(false);
    h.monitor.transition(ConnectionStatus::Connected);
    h.wire.hang_sends.store(true, Ordering::Relaxed);
    enqueue(&h, 1);

    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Failed);
    assert_eq!(h.dispatcher.send_failures_total(), 1);
    assert_eq!(sent_count(&h), 0);
}

#[tokio::test]
async fn dispatcher_fails_when_client_could_not_be_built() {
    let h = harness(false);
    h.wire.fail_builds.store(true, Ordering::Relaxed);
    h.monitor.transition(ConnectionStatus::Connected);
    assert_eq!(h.dispatcher.client_rebuilds_total(), 0);
    enqueue(&h, 1);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::Failed);
}

#[tokio::test]
async fn dispatcher_discards_while_disconnected_when_configured() {
    let h = harness(true);
    enqueue(&h, 4);
    assert_eq!(h.dispatcher.tick().await, DispatchOutcome::NotConnected);
    assert!(h.queue.is_empty());
    assert_eq!(h.dispatcher.discarded_total(), 4);
    assert_eq!(sent_count(&h), 0);
}

#[tokio::test]
async fn dispatcher_attached_late_adopts_connected_status() {
    let wire = Arc::new(Wire::default());
    let monitor = ConnectionStatusMonitor::new();
    monitor.transition(ConnectionStatus::Connected);
    let dispatcher = Arc::new(BatchDispatcher::new(
        Arc::new(BoundedSampleQueue::new(10)),
        Arc::new(RegistrationState::new()),
        Arc::new(FakeChannel { wire: wire.clone() }),
        DispatcherConfig {
            send_timeout: Duration::from_millis(100),
            discard_while_disconnected: false,
        },
    ));
    dispatcher.attach(&monitor);
    assert_eq!(dispatcher.status(), ConnectionStatus::Connected);
    assert_eq!(dispatcher.client_rebuilds_total(), 1);
}
