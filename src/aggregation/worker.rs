// Aggregation worker pool. Records are routed by distribution key so every time bucket
// of one dimensional identity lands on the same worker. Each worker merges, flushes
// closed buckets on a timer, and hands finalized records to the persistence writer.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, interval};
use tracing::{Instrument, debug, info_span, warn};

use super::StreamAggregator;
use crate::indicator::{
    IndicatorRecord, InstanceGcCountIndicator, InstanceMemoryIndicator,
    ServiceCallRelationIndicator,
};

/// Upper bound on the late-arrival allowance.
pub const MAX_GRACE_SECS: u64 = 24 * 60 * 60;

/// One aggregator per indicator kind.
#[derive(Default)]
pub struct Aggregators {
    relation: StreamAggregator<ServiceCallRelationIndicator>,
    memory: StreamAggregator<InstanceMemoryIndicator>,
    gc: StreamAggregator<InstanceGcCountIndicator>,
}

impl Aggregators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive(&self, record: IndicatorRecord) {
        match record {
            IndicatorRecord::ServiceCallRelation(i) => self.relation.receive(i),
            IndicatorRecord::InstanceMemory(i) => self.memory.receive(i),
            IndicatorRecord::InstanceGcCount(i) => self.gc.receive(i),
        }
    }

    pub fn flush(&self, now: chrono::DateTime<Utc>, grace: TimeDelta) -> Vec<IndicatorRecord> {
        let mut out: Vec<IndicatorRecord> = Vec::new();
        out.extend(self.relation.flush(now, grace).into_iter().map(IndicatorRecord::from));
        out.extend(self.memory.flush(now, grace).into_iter().map(IndicatorRecord::from));
        out.extend(self.gc.flush(now, grace).into_iter().map(IndicatorRecord::from));
        out
    }

    pub fn drain(&self) -> Vec<IndicatorRecord> {
        let mut out: Vec<IndicatorRecord> = Vec::new();
        out.extend(self.relation.drain().into_iter().map(IndicatorRecord::from));
        out.extend(self.memory.drain().into_iter().map(IndicatorRecord::from));
        out.extend(self.gc.drain().into_iter().map(IndicatorRecord::from));
        out
    }

    pub fn len(&self) -> usize {
        self.relation.len() + self.memory.len() + self.gc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("aggregation worker {0} has shut down")]
    WorkerClosed(usize),
}

/// Sending side of the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerRouter {
    senders: Arc<[mpsc::Sender<IndicatorRecord>]>,
}

impl WorkerRouter {
    pub fn new(senders: Vec<mpsc::Sender<IndicatorRecord>>) -> Self {
        Self {
            senders: senders.into(),
        }
    }

    /// Deterministic worker index for a distribution key. `workers` must be non-zero.
    pub fn select(distribution_key: i32, workers: usize) -> usize {
        let workers = i64::try_from(workers.max(1)).unwrap_or(i64::MAX);
        i64::from(distribution_key).rem_euclid(workers) as usize
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    pub async fn route(&self, record: IndicatorRecord) -> Result<(), RouteError> {
        let index = Self::select(record.distribution_key(), self.senders.len());
        self.senders[index]
            .send(record)
            .await
            .map_err(|_| RouteError::WorkerClosed(index))
    }

    pub async fn route_all(&self, records: Vec<IndicatorRecord>) -> Result<usize, RouteError> {
        let n = records.len();
        for record in records {
            self.route(record).await?;
        }
        Ok(n)
    }
}

/// Worker pool sizing and flush timing.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub channel_capacity: usize,
    pub flush_interval_secs: u64,
    /// Late-arrival allowance after a bucket's window ends.
    pub flush_grace_secs: u64,
}

/// Spawns the worker pool. Workers stop on shutdown (or when every router clone is
/// dropped), finalize all open entries, and forward them before exiting.
pub fn spawn_workers(
    config: WorkerPoolConfig,
    persist_tx: mpsc::Sender<Vec<IndicatorRecord>>,
    shutdown_rx: watch::Receiver<bool>,
) -> (WorkerRouter, Vec<tokio::task::JoinHandle<()>>) {
    let workers = config.workers.max(1);
    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        senders.push(tx);
        let span = info_span!("aggregation_worker", worker = index);
        handles.push(tokio::spawn(
            run_worker(
                index,
                rx,
                persist_tx.clone(),
                shutdown_rx.clone(),
                config.clone(),
            )
            .instrument(span),
        ));
    }
    (WorkerRouter::new(senders), handles)
}

async fn run_worker(
    index: usize,
    mut rx: mpsc::Receiver<IndicatorRecord>,
    persist_tx: mpsc::Sender<Vec<IndicatorRecord>>,
    mut shutdown_rx: watch::Receiver<bool>,
    config: WorkerPoolConfig,
) {
    let aggregators = Aggregators::new();
    let grace = TimeDelta::seconds(config.flush_grace_secs.min(MAX_GRACE_SECS) as i64);
    let mut flush_tick = interval(Duration::from_secs(config.flush_interval_secs));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(record) => aggregators.receive(record),
                    None => break,
                }
            }
            _ = flush_tick.tick() => {
                let flushed = aggregators.flush(Utc::now(), grace);
                if !flushed.is_empty() {
                    debug!(
                        operation = "flush",
                        flushed = flushed.len(),
                        open = aggregators.len(),
                        "closed buckets finalized"
                    );
                }
                forward(&persist_tx, flushed).await;
            }
            _ = shutdown_rx.changed() => {
                break;
            }
        }
    }

    rx.close();
    while let Ok(record) = rx.try_recv() {
        aggregators.receive(record);
    }
    let drained = aggregators.drain();
    debug!(worker = index, drained = drained.len(), "aggregation worker shutting down");
    forward(&persist_tx, drained).await;
}

async fn forward(persist_tx: &mpsc::Sender<Vec<IndicatorRecord>>, records: Vec<IndicatorRecord>) {
    if records.is_empty() {
        return;
    }
    let n = records.len();
    if persist_tx.send(records).await.is_err() {
        warn!(
            operation = "forward_flushed",
            records = n,
            "persistence writer closed; dropping finalized records"
        );
    }
}
