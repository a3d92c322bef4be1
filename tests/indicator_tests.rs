// Indicator model tests: identity, merge laws, downsampling, remote and row mappings

mod common;

use apm_telemetry::indicator::{
    Downsampling, Indicator, IndicatorError, IndicatorKind, IndicatorRecord,
    InstanceGcCountIndicator, InstanceMemoryIndicator, ServiceCallRelationIndicator,
    StorageBuilder, StorageError, TimeBucket,
};
use apm_telemetry::models::{GcPhase, RemoteData, RemoteMessage};
use common::bucket;

#[test]
fn relation_id_is_bucket_then_dimensions() {
    let r = ServiceCallRelationIndicator::new(3, 7, bucket(202401011230));
    assert_eq!(r.id(), "202401011230_3_7");
}

#[test]
fn gc_id_includes_phase_code() {
    let gc = InstanceGcCountIndicator {
        service_instance_id: 9,
        phase: GcPhase::Old,
        time_bucket: bucket(2024010112),
        count: 1,
    };
    assert_eq!(gc.id(), "2024010112_9_1");
}

#[test]
fn relation_combine_and_calculate_are_no_ops() {
    let mut a = ServiceCallRelationIndicator::new(1, 2, bucket(202401011230));
    let b = a.clone();
    a.combine(&b);
    a.calculate();
    assert_eq!(a, b);
    assert_eq!(a.id(), b.id());
}

#[test]
fn memory_combine_is_commutative_and_associative() {
    let t = bucket(202401011230);
    let x = InstanceMemoryIndicator::observe(5, t, 100);
    let y = InstanceMemoryIndicator::observe(5, t, 250);
    let z = InstanceMemoryIndicator::observe(5, t, 40);

    let mut xy = x.clone();
    xy.combine(&y);
    let mut yx = y.clone();
    yx.combine(&x);
    assert_eq!((xy.summation, xy.count), (yx.summation, yx.count));

    let mut left = xy.clone();
    left.combine(&z);
    let mut yz = y.clone();
    yz.combine(&z);
    let mut right = x.clone();
    right.combine(&yz);
    assert_eq!((left.summation, left.count), (right.summation, right.count));
    assert_eq!((left.summation, left.count), (390, 3));
}

#[test]
fn memory_calculate_averages_and_is_idempotent() {
    let t = bucket(202401011230);
    let mut m = InstanceMemoryIndicator::observe(5, t, 100);
    m.combine(&InstanceMemoryIndicator::observe(5, t, 300));
    m.calculate();
    assert_eq!(m.value, 200);
    m.calculate();
    assert_eq!(m.value, 200);
}

#[test]
fn gc_combine_sums_counts() {
    let t = bucket(202401011230);
    let mut a = InstanceGcCountIndicator {
        service_instance_id: 5,
        phase: GcPhase::Young,
        time_bucket: t,
        count: 4,
    };
    let b = InstanceGcCountIndicator { count: 6, ..a.clone() };
    a.combine(&b);
    assert_eq!(a.count, 10);
}

#[test]
fn downsampling_keeps_distribution_key_and_changes_identity() {
    let minute = ServiceCallRelationIndicator::new(11, 22, bucket(202401011230));
    let hour = minute.to_hour();
    let day = minute.to_day();
    let month = minute.to_month();

    assert_eq!(hour.time_bucket().value(), 2024010112);
    assert_eq!(day.time_bucket().value(), 20240101);
    assert_eq!(month.time_bucket().value(), 202401);
    assert_eq!(month.time_bucket().downsampling(), Downsampling::Month);

    for d in [&hour, &day, &month] {
        assert_eq!(d.remote_hash_code(), minute.remote_hash_code());
        assert_ne!(d.id(), minute.id());
        assert_eq!(
            (d.source_service_id, d.dest_service_id),
            (minute.source_service_id, minute.dest_service_id)
        );
    }
}

#[test]
fn downsampling_keeps_measures() {
    let mut m = InstanceMemoryIndicator::observe(5, bucket(202401011230), 100);
    m.calculate();
    let hour = m.to_hour();
    assert_eq!(
        (hour.summation, hour.count, hour.value),
        (m.summation, m.count, m.value)
    );
}

#[test]
fn to_coarser_walks_one_tier_and_stops_at_month() {
    let m = InstanceMemoryIndicator::observe(5, bucket(202401011230), 100);
    let hour = m.to_coarser().unwrap();
    assert_eq!(hour.time_bucket().downsampling(), Downsampling::Hour);
    let month = m.to_month();
    assert!(month.to_coarser().is_none());
}

#[test]
fn distribution_key_uses_seventeen_thirty_one_fold() {
    let r = ServiceCallRelationIndicator::new(3, 7, bucket(202401011230));
    assert_eq!(r.remote_hash_code(), (17 * 31 + 3) * 31 + 7);
}

#[test]
fn distribution_key_equal_for_records_in_different_buckets() {
    let a = InstanceMemoryIndicator::observe(5, bucket(202401011230), 1);
    let b = InstanceMemoryIndicator::observe(5, bucket(202402021000), 2);
    assert_eq!(a.remote_hash_code(), b.remote_hash_code());
    assert_ne!(a.id(), b.id());
}

#[test]
fn relation_remote_slots_follow_layout() {
    let r = ServiceCallRelationIndicator::new(3, 7, bucket(202401011230));
    let data = r.serialize();
    assert_eq!(data.data_integers, vec![3, 7]);
    assert_eq!(data.data_longs, vec![202401011230]);
    assert!(data.data_strings.is_empty());
    assert_eq!(ServiceCallRelationIndicator::deserialize(&data).unwrap(), r);
}

#[test]
fn memory_remote_round_trip_preserves_measures() {
    let mut m = InstanceMemoryIndicator::observe(5, bucket(2024010112), 100);
    m.combine(&InstanceMemoryIndicator::observe(5, bucket(2024010112), 50));
    m.calculate();
    let back = InstanceMemoryIndicator::deserialize(&m.serialize()).unwrap();
    assert_eq!(back.id(), m.id());
    assert_eq!(
        (back.summation, back.count, back.value),
        (m.summation, m.count, m.value)
    );
    assert_eq!(back.time_bucket().downsampling(), Downsampling::Hour);
}

#[test]
fn replica_receives_identical_bytes() {
    // Node A forwards a record to node B, which re-serializes it unchanged.
    let record: IndicatorRecord =
        ServiceCallRelationIndicator::new(3, 7, bucket(202401011230)).into();
    let sent = record.to_remote().encode().unwrap();

    let received = RemoteMessage::decode(&sent).unwrap();
    let rebuilt = IndicatorRecord::from_remote(&received).unwrap();
    assert_eq!(rebuilt.id(), "202401011230_3_7");
    assert_eq!(rebuilt.to_remote().encode().unwrap(), sent);
}

#[test]
fn deserialize_reports_missing_slot() {
    let data = RemoteData {
        data_integers: vec![3],
        data_longs: vec![202401011230],
        data_strings: vec![],
    };
    let err = ServiceCallRelationIndicator::deserialize(&data).unwrap_err();
    assert!(matches!(
        err,
        IndicatorError::MissingSlot {
            slot: "integer",
            index: 1
        }
    ));
}

#[test]
fn remote_data_slot_accessors() {
    let data = RemoteData {
        data_integers: vec![3],
        data_longs: vec![202401011230],
        data_strings: vec!["checkout".to_string()],
    };
    assert_eq!(data.integer(0).unwrap(), 3);
    assert_eq!(data.long(0).unwrap(), 202401011230);
    assert_eq!(data.string(0).unwrap(), "checkout");
    assert!(matches!(
        data.string(1),
        Err(IndicatorError::MissingSlot {
            slot: "string",
            index: 1
        })
    ));
}

#[test]
fn deserialize_rejects_unknown_gc_phase() {
    let data = RemoteData {
        data_integers: vec![5, 9],
        data_longs: vec![202401011230, 1],
        data_strings: vec![],
    };
    let err = InstanceGcCountIndicator::deserialize(&data).unwrap_err();
    assert!(matches!(err, IndicatorError::UnknownCode { code: 9, .. }));
}

#[test]
fn deserialize_rejects_bad_time_bucket() {
    let data = RemoteData {
        data_integers: vec![3, 7],
        data_longs: vec![202413011230],
        data_strings: vec![],
    };
    assert!(matches!(
        ServiceCallRelationIndicator::deserialize(&data),
        Err(IndicatorError::InvalidTimeBucket(_))
    ));
}

#[test]
fn memory_row_round_trip() {
    let mut m = InstanceMemoryIndicator::observe(5, bucket(20240101), 100);
    m.calculate();
    let row = m.to_row();
    assert_eq!(row.len(), InstanceMemoryIndicator::COLUMNS.len());
    let back = InstanceMemoryIndicator::from_row(&row).unwrap();
    assert_eq!(back.id(), m.id());
    assert_eq!((back.summation, back.count, back.value), (100, 1, 100));
}

#[test]
fn from_row_reports_missing_column() {
    let mut row = ServiceCallRelationIndicator::new(1, 2, bucket(202401011230)).to_row();
    row.remove("dest_service_id");
    assert!(matches!(
        ServiceCallRelationIndicator::from_row(&row),
        Err(StorageError::MissingColumn("dest_service_id"))
    ));
}

#[test]
fn record_combine_rejects_kind_mismatch() {
    let t = bucket(202401011230);
    let mut relation: IndicatorRecord = ServiceCallRelationIndicator::new(1, 2, t).into();
    let memory: IndicatorRecord = InstanceMemoryIndicator::observe(1, t, 10).into();
    let err = relation.combine(&memory).unwrap_err();
    assert!(matches!(
        err,
        IndicatorError::KindMismatch {
            left: IndicatorKind::ServiceCallRelation,
            right: IndicatorKind::InstanceMemory
        }
    ));
}

#[test]
fn kind_index_names_resolve() {
    for kind in IndicatorKind::ALL {
        assert_eq!(IndicatorKind::from_index_name(kind.index_name()), Some(kind));
    }
    assert_eq!(IndicatorKind::from_index_name("nope"), None);
}

#[test]
fn time_bucket_rejects_out_of_range_millis() {
    assert!(TimeBucket::minute_from_millis(i64::MAX).is_err());
}
