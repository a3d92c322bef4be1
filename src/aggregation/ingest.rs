// Turns agent batches and call observations into minute-bucket indicators.

use tracing::warn;

use crate::indicator::{
    IndicatorRecord, InstanceGcCountIndicator, InstanceMemoryIndicator,
    ServiceCallRelationIndicator, TimeBucket,
};
use crate::models::{MemoryArea, MetricBatch, ServiceCallObservation};

/// One memory indicator per sample (resident area) and one GC indicator per GC reading.
/// Samples with an unusable timestamp are skipped.
pub fn indicators_from_batch(batch: &MetricBatch) -> Vec<IndicatorRecord> {
    let instance_id = batch.application_instance_id;
    let mut out = Vec::with_capacity(batch.metrics.len() * 2);
    for sample in &batch.metrics {
        let bucket = match TimeBucket::minute_from_millis(sample.time) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, instance_id, "dropping sample with bad timestamp");
                continue;
            }
        };
        for memory in sample
            .memory
            .iter()
            .filter(|m| m.area == MemoryArea::Resident)
        {
            let used = i64::try_from(memory.used).unwrap_or(i64::MAX);
            out.push(InstanceMemoryIndicator::observe(instance_id, bucket, used).into());
        }
        for gc in &sample.gc {
            out.push(
                InstanceGcCountIndicator {
                    service_instance_id: instance_id,
                    phase: gc.phase,
                    time_bucket: bucket,
                    count: i64::try_from(gc.count).unwrap_or(i64::MAX),
                }
                .into(),
            );
        }
    }
    out
}

pub fn indicators_from_observations(
    observations: &[ServiceCallObservation],
) -> Vec<IndicatorRecord> {
    observations
        .iter()
        .filter_map(|o| match TimeBucket::minute_from_millis(o.time) {
            Ok(bucket) => Some(
                ServiceCallRelationIndicator::new(o.source_service_id, o.dest_service_id, bucket)
                    .into(),
            ),
            Err(e) => {
                warn!(error = %e, "dropping call observation with bad timestamp");
                None
            }
        })
        .collect()
}
