// Dedicated persistence writer: aggregation workers hand over finalized records through a
// channel; the writer batches them and merges into SQLite.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::time::{Duration, interval};

use super::IndicatorRepo;
use crate::indicator::IndicatorRecord;

/// Upper bound for `storage.flush_rate`.
pub const MAX_FLUSH_RATE: u64 = 100_000;

/// Channel capacity for the writer (backpressure if it falls behind).
pub fn writer_channel_capacity(flush_rate: u64) -> usize {
    let capacity = flush_rate.min(MAX_FLUSH_RATE).saturating_mul(2);
    usize::try_from(capacity).unwrap_or(usize::MAX).max(32)
}

#[derive(Debug, Clone)]
pub struct IndicatorWriterConfig {
    pub flush_rate: u64,
    pub flush_interval_secs: u64,
}

/// Flushes when buffer len >= flush_rate, every flush_interval_secs, or when the channel
/// closes. Exits after a final flush once every sender is dropped.
pub fn spawn_indicator_writer(
    mut write_rx: mpsc::Receiver<Vec<IndicatorRecord>>,
    repo: Arc<IndicatorRepo>,
    config: IndicatorWriterConfig,
    records_saved_total: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs.max(1));
    tokio::spawn(async move {
        let mut buffer: Vec<IndicatorRecord> = Vec::new();
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = write_rx.recv() => {
                    match result {
                        Some(records) => {
                            buffer.extend(records);
                            if buffer.len() >= config.flush_rate as usize
                                && let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await
                            {
                                tracing::warn!(error = %e, "indicator writer: merge_and_save failed");
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    if let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await {
                        tracing::warn!(error = %e, "indicator writer: merge_and_save failed");
                    }
                }
            }
        }
        if let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await {
            tracing::warn!(error = %e, "indicator writer: final flush failed");
        }
        tracing::debug!("Indicator writer shutting down");
    })
}

// A failed batch is dropped rather than retried so one bad row cannot wedge the writer.
async fn flush_buffer(
    repo: &IndicatorRepo,
    buffer: &mut Vec<IndicatorRecord>,
    records_saved_total: &AtomicU64,
) -> anyhow::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let records = std::mem::take(buffer);
    let n = records.len();
    repo.merge_and_save(&records).await?;
    records_saved_total.fetch_add(n as u64, Ordering::Relaxed);
    tracing::debug!(
        operation = "merge_and_save",
        records_count = n,
        "Indicators saved"
    );
    Ok(())
}
