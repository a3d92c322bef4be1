// StreamAggregator tests: merge, closed-bucket flush, tier cascade, drain, concurrency

mod common;

use apm_telemetry::aggregation::StreamAggregator;
use apm_telemetry::aggregation::worker::{Aggregators, WorkerRouter};
use apm_telemetry::indicator::{
    Downsampling, Indicator, IndicatorRecord, InstanceMemoryIndicator,
    ServiceCallRelationIndicator,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use common::bucket;
use std::sync::Arc;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn grace() -> TimeDelta {
    TimeDelta::seconds(10)
}

#[test]
fn aggregator_merges_same_identity() {
    let agg = StreamAggregator::new();
    let t = bucket(202401011230);
    agg.receive(InstanceMemoryIndicator::observe(5, t, 100));
    agg.receive(InstanceMemoryIndicator::observe(5, t, 300));
    agg.receive(InstanceMemoryIndicator::observe(6, t, 50));

    assert_eq!(agg.len(), 2);
    let merged = agg.get("202401011230_5").unwrap();
    assert_eq!((merged.summation, merged.count), (400, 2));
}

#[test]
fn aggregator_keeps_open_buckets_on_flush() {
    let agg = StreamAggregator::new();
    agg.receive(ServiceCallRelationIndicator::new(1, 2, bucket(202401011230)));
    // Window ends 12:31:00, grace 10s.
    assert!(agg.flush(at(2024, 1, 1, 12, 31, 5), grace()).is_empty());
    assert_eq!(agg.len(), 1);
}

#[test]
fn aggregator_flush_finalizes_and_cascades_one_tier() {
    let agg = StreamAggregator::new();
    let t = bucket(202401011230);
    agg.receive(InstanceMemoryIndicator::observe(5, t, 100));
    agg.receive(InstanceMemoryIndicator::observe(5, t, 300));

    let flushed = agg.flush(at(2024, 1, 1, 12, 31, 10), grace());
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].value, 200);
    assert_eq!(flushed[0].time_bucket().downsampling(), Downsampling::Minute);

    // Hour copy now open, not yet closed.
    assert_eq!(agg.len(), 1);
    let hour = agg.get("2024010112_5").unwrap();
    assert_eq!((hour.summation, hour.count), (400, 2));
}

#[test]
fn aggregator_hour_tier_merges_minutes_then_closes() {
    let agg = StreamAggregator::new();
    agg.receive(InstanceMemoryIndicator::observe(5, bucket(202401011230), 100));
    agg.receive(InstanceMemoryIndicator::observe(5, bucket(202401011245), 300));

    let minutes = agg.flush(at(2024, 1, 1, 12, 50, 0), grace());
    assert_eq!(minutes.len(), 2);

    let hours = agg.flush(at(2024, 1, 1, 13, 0, 10), grace());
    assert_eq!(hours.len(), 1);
    assert_eq!(hours[0].id(), "2024010112_5");
    assert_eq!((hours[0].summation, hours[0].count, hours[0].value), (400, 2, 200));

    // Day copy waits for midnight.
    assert_eq!(agg.len(), 1);
    assert!(agg.get("20240101_5").is_some());
}

#[test]
fn aggregator_late_record_after_flush_opens_new_entry() {
    let agg = StreamAggregator::new();
    let t = bucket(202401011230);
    agg.receive(InstanceMemoryIndicator::observe(5, t, 100));
    agg.flush(at(2024, 1, 1, 12, 32, 0), grace());

    agg.receive(InstanceMemoryIndicator::observe(5, t, 500));
    let late = agg.get("202401011230_5").unwrap();
    assert_eq!((late.summation, late.count), (500, 1));
}

#[test]
fn aggregator_drain_finalizes_every_tier() {
    let agg = StreamAggregator::new();
    agg.receive(ServiceCallRelationIndicator::new(1, 2, bucket(202401011230)));

    let drained = agg.drain();
    let tiers: Vec<Downsampling> = drained
        .iter()
        .map(|i| i.time_bucket().downsampling())
        .collect();
    assert_eq!(
        tiers,
        vec![
            Downsampling::Minute,
            Downsampling::Hour,
            Downsampling::Day,
            Downsampling::Month
        ]
    );
    assert!(agg.is_empty());
}

#[test]
fn aggregator_concurrent_receives_lose_nothing() {
    let agg = Arc::new(StreamAggregator::new());
    let t = bucket(202401011230);
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    agg.receive(InstanceMemoryIndicator::observe(5, t, 2));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    let merged = agg.get("202401011230_5").unwrap();
    assert_eq!((merged.summation, merged.count), (16_000, 8000));
}

#[test]
fn aggregators_route_records_by_kind() {
    let aggs = Aggregators::new();
    let t = bucket(202401011230);
    aggs.receive(ServiceCallRelationIndicator::new(1, 2, t).into());
    aggs.receive(InstanceMemoryIndicator::observe(1, t, 5).into());
    assert_eq!(aggs.len(), 2);

    let flushed = aggs.flush(at(2024, 1, 1, 12, 40, 0), grace());
    assert_eq!(flushed.len(), 2);
    assert!(matches!(flushed[0], IndicatorRecord::ServiceCallRelation(_)));
    assert!(matches!(flushed[1], IndicatorRecord::InstanceMemory(_)));
}

#[test]
fn router_select_is_deterministic_and_in_range() {
    for key in [i32::MIN, -17, -1, 0, 1, 16437, i32::MAX] {
        let index = WorkerRouter::select(key, 4);
        assert!(index < 4);
        assert_eq!(index, WorkerRouter::select(key, 4));
    }
    assert_eq!(WorkerRouter::select(-1, 4), 3);
}

#[test]
fn router_sends_every_tier_of_an_identity_to_one_worker() {
    let minute: IndicatorRecord =
        ServiceCallRelationIndicator::new(3, 7, bucket(202401011230)).into();
    let month: IndicatorRecord =
        ServiceCallRelationIndicator::new(3, 7, bucket(202401)).into();
    assert_eq!(
        WorkerRouter::select(minute.distribution_key(), 8),
        WorkerRouter::select(month.distribution_key(), 8)
    );
}
