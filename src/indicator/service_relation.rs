// Service-to-service call relation. Purely dimensional: the record's existence in a
// bucket is the signal, so combine and calculate have nothing to merge.
//
// Remote slots: integers[0] = source_service_id, integers[1] = dest_service_id,
// longs[0] = time_bucket.

use std::hash::{Hash, Hasher};

use super::storage::{
    Column, ColumnType, ColumnValue, Row, StorageBuilder, StorageError, TIME_BUCKET, row_int,
    row_long,
};
use super::{ID_SPLIT, Indicator, IndicatorError, IndicatorKind, TimeBucket, hash_fold};
use crate::models::RemoteData;

pub const SOURCE_SERVICE_ID: &str = "source_service_id";
pub const DEST_SERVICE_ID: &str = "dest_service_id";

#[derive(Debug, Clone)]
pub struct ServiceCallRelationIndicator {
    pub source_service_id: i32,
    pub dest_service_id: i32,
    pub time_bucket: TimeBucket,
}

impl ServiceCallRelationIndicator {
    pub fn new(source_service_id: i32, dest_service_id: i32, time_bucket: TimeBucket) -> Self {
        Self {
            source_service_id,
            dest_service_id,
            time_bucket,
        }
    }
}

impl Indicator for ServiceCallRelationIndicator {
    const KIND: IndicatorKind = IndicatorKind::ServiceCallRelation;

    fn time_bucket(&self) -> TimeBucket {
        self.time_bucket
    }

    fn id(&self) -> String {
        format!(
            "{}{ID_SPLIT}{}{ID_SPLIT}{}",
            self.time_bucket, self.source_service_id, self.dest_service_id
        )
    }

    fn combine(&mut self, other: &Self) {
        debug_assert!(*self == *other, "combine across identities");
    }

    fn calculate(&mut self) {}

    fn with_time_bucket(&self, bucket: TimeBucket) -> Self {
        Self::new(self.source_service_id, self.dest_service_id, bucket)
    }

    fn remote_hash_code(&self) -> i32 {
        hash_fold(&[self.source_service_id, self.dest_service_id])
    }

    fn serialize(&self) -> RemoteData {
        RemoteData {
            data_integers: vec![self.source_service_id, self.dest_service_id],
            data_longs: vec![self.time_bucket.value()],
            data_strings: vec![],
        }
    }

    fn deserialize(data: &RemoteData) -> Result<Self, IndicatorError> {
        Ok(Self::new(
            data.integer(0)?,
            data.integer(1)?,
            TimeBucket::from_value(data.long(0)?)?,
        ))
    }
}

impl StorageBuilder for ServiceCallRelationIndicator {
    const INDEX_NAME: &'static str = "service_call_relation";
    const COLUMNS: &'static [Column] = &[
        Column::new(SOURCE_SERVICE_ID, ColumnType::Int),
        Column::new(DEST_SERVICE_ID, ColumnType::Int),
        Column::new(TIME_BUCKET, ColumnType::Long),
    ];

    fn to_row(&self) -> Row {
        Row::from([
            (
                SOURCE_SERVICE_ID.to_string(),
                ColumnValue::Int(self.source_service_id),
            ),
            (
                DEST_SERVICE_ID.to_string(),
                ColumnValue::Int(self.dest_service_id),
            ),
            (
                TIME_BUCKET.to_string(),
                ColumnValue::Long(self.time_bucket.value()),
            ),
        ])
    }

    fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self::new(
            row_int(row, SOURCE_SERVICE_ID)?,
            row_int(row, DEST_SERVICE_ID)?,
            TimeBucket::from_value(row_long(row, TIME_BUCKET)?)?,
        ))
    }
}

impl PartialEq for ServiceCallRelationIndicator {
    fn eq(&self, other: &Self) -> bool {
        self.source_service_id == other.source_service_id
            && self.dest_service_id == other.dest_service_id
            && self.time_bucket.value() == other.time_bucket.value()
    }
}

impl Eq for ServiceCallRelationIndicator {}

impl Hash for ServiceCallRelationIndicator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_service_id.hash(state);
        self.dest_service_id.hash(state);
        self.time_bucket.value().hash(state);
    }
}
