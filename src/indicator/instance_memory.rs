// Average resident memory of one service instance over a bucket.
// combine sums the running totals; calculate derives the average from them.
//
// Remote slots: integers[0] = service_instance_id, integers[1] = count,
// longs[0] = time_bucket, longs[1] = summation, longs[2] = value.

use std::hash::{Hash, Hasher};

use super::storage::{
    Column, ColumnType, ColumnValue, Row, StorageBuilder, StorageError, TIME_BUCKET, row_int,
    row_long,
};
use super::{ID_SPLIT, Indicator, IndicatorError, IndicatorKind, TimeBucket, hash_fold};
use crate::models::RemoteData;

pub const SERVICE_INSTANCE_ID: &str = "service_instance_id";
pub const SUMMATION: &str = "summation";
pub const COUNT: &str = "count";
pub const VALUE: &str = "value";

#[derive(Debug, Clone)]
pub struct InstanceMemoryIndicator {
    pub service_instance_id: i32,
    pub time_bucket: TimeBucket,
    pub summation: i64,
    pub count: i32,
    /// Average bytes; valid after `calculate`.
    pub value: i64,
}

impl InstanceMemoryIndicator {
    /// A single observation of `used_bytes`.
    pub fn observe(service_instance_id: i32, time_bucket: TimeBucket, used_bytes: i64) -> Self {
        Self {
            service_instance_id,
            time_bucket,
            summation: used_bytes,
            count: 1,
            value: 0,
        }
    }
}

impl Indicator for InstanceMemoryIndicator {
    const KIND: IndicatorKind = IndicatorKind::InstanceMemory;

    fn time_bucket(&self) -> TimeBucket {
        self.time_bucket
    }

    fn id(&self) -> String {
        format!("{}{ID_SPLIT}{}", self.time_bucket, self.service_instance_id)
    }

    fn combine(&mut self, other: &Self) {
        debug_assert!(*self == *other, "combine across identities");
        self.summation = self.summation.saturating_add(other.summation);
        self.count = self.count.saturating_add(other.count);
    }

    fn calculate(&mut self) {
        if self.count > 0 {
            self.value = self.summation / i64::from(self.count);
        }
    }

    fn with_time_bucket(&self, bucket: TimeBucket) -> Self {
        Self {
            time_bucket: bucket,
            ..self.clone()
        }
    }

    fn remote_hash_code(&self) -> i32 {
        hash_fold(&[self.service_instance_id])
    }

    fn serialize(&self) -> RemoteData {
        RemoteData {
            data_integers: vec![self.service_instance_id, self.count],
            data_longs: vec![self.time_bucket.value(), self.summation, self.value],
            data_strings: vec![],
        }
    }

    fn deserialize(data: &RemoteData) -> Result<Self, IndicatorError> {
        Ok(Self {
            service_instance_id: data.integer(0)?,
            count: data.integer(1)?,
            time_bucket: TimeBucket::from_value(data.long(0)?)?,
            summation: data.long(1)?,
            value: data.long(2)?,
        })
    }
}

impl StorageBuilder for InstanceMemoryIndicator {
    const INDEX_NAME: &'static str = "instance_memory";
    const COLUMNS: &'static [Column] = &[
        Column::new(SERVICE_INSTANCE_ID, ColumnType::Int),
        Column::new(SUMMATION, ColumnType::Long),
        Column::new(COUNT, ColumnType::Int),
        Column::new(VALUE, ColumnType::Long),
        Column::new(TIME_BUCKET, ColumnType::Long),
    ];

    fn to_row(&self) -> Row {
        Row::from([
            (
                SERVICE_INSTANCE_ID.to_string(),
                ColumnValue::Int(self.service_instance_id),
            ),
            (SUMMATION.to_string(), ColumnValue::Long(self.summation)),
            (COUNT.to_string(), ColumnValue::Int(self.count)),
            (VALUE.to_string(), ColumnValue::Long(self.value)),
            (
                TIME_BUCKET.to_string(),
                ColumnValue::Long(self.time_bucket.value()),
            ),
        ])
    }

    fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            service_instance_id: row_int(row, SERVICE_INSTANCE_ID)?,
            summation: row_long(row, SUMMATION)?,
            count: row_int(row, COUNT)?,
            value: row_long(row, VALUE)?,
            time_bucket: TimeBucket::from_value(row_long(row, TIME_BUCKET)?)?,
        })
    }
}

impl PartialEq for InstanceMemoryIndicator {
    fn eq(&self, other: &Self) -> bool {
        self.service_instance_id == other.service_instance_id
            && self.time_bucket.value() == other.time_bucket.value()
    }
}

impl Eq for InstanceMemoryIndicator {}

impl Hash for InstanceMemoryIndicator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_instance_id.hash(state);
        self.time_bucket.value().hash(state);
    }
}
