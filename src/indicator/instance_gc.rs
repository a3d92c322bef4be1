// Garbage collection count per instance and phase. Counts are deltas, so combine sums.
//
// Remote slots: integers[0] = service_instance_id, integers[1] = phase code,
// longs[0] = time_bucket, longs[1] = count.

use std::hash::{Hash, Hasher};

use super::storage::{
    Column, ColumnType, ColumnValue, Row, StorageBuilder, StorageError, TIME_BUCKET, row_int,
    row_long,
};
use super::{ID_SPLIT, Indicator, IndicatorError, IndicatorKind, TimeBucket, hash_fold};
use crate::models::{GcPhase, RemoteData};

pub const SERVICE_INSTANCE_ID: &str = "service_instance_id";
pub const PHASE: &str = "phase";
pub const COUNT: &str = "count";

#[derive(Debug, Clone)]
pub struct InstanceGcCountIndicator {
    pub service_instance_id: i32,
    pub phase: GcPhase,
    pub time_bucket: TimeBucket,
    pub count: i64,
}

fn phase_from_code(code: i32) -> Result<GcPhase, IndicatorError> {
    GcPhase::from_code(code).ok_or(IndicatorError::UnknownCode {
        field: PHASE,
        code,
    })
}

impl Indicator for InstanceGcCountIndicator {
    const KIND: IndicatorKind = IndicatorKind::InstanceGcCount;

    fn time_bucket(&self) -> TimeBucket {
        self.time_bucket
    }

    fn id(&self) -> String {
        format!(
            "{}{ID_SPLIT}{}{ID_SPLIT}{}",
            self.time_bucket,
            self.service_instance_id,
            self.phase.code()
        )
    }

    fn combine(&mut self, other: &Self) {
        debug_assert!(*self == *other, "combine across identities");
        self.count = self.count.saturating_add(other.count);
    }

    fn calculate(&mut self) {}

    fn with_time_bucket(&self, bucket: TimeBucket) -> Self {
        Self {
            time_bucket: bucket,
            ..self.clone()
        }
    }

    fn remote_hash_code(&self) -> i32 {
        hash_fold(&[self.service_instance_id, self.phase.code()])
    }

    fn serialize(&self) -> RemoteData {
        RemoteData {
            data_integers: vec![self.service_instance_id, self.phase.code()],
            data_longs: vec![self.time_bucket.value(), self.count],
            data_strings: vec![],
        }
    }

    fn deserialize(data: &RemoteData) -> Result<Self, IndicatorError> {
        Ok(Self {
            service_instance_id: data.integer(0)?,
            phase: phase_from_code(data.integer(1)?)?,
            time_bucket: TimeBucket::from_value(data.long(0)?)?,
            count: data.long(1)?,
        })
    }
}

impl StorageBuilder for InstanceGcCountIndicator {
    const INDEX_NAME: &'static str = "instance_gc_count";
    const COLUMNS: &'static [Column] = &[
        Column::new(SERVICE_INSTANCE_ID, ColumnType::Int),
        Column::new(PHASE, ColumnType::Int),
        Column::new(COUNT, ColumnType::Long),
        Column::new(TIME_BUCKET, ColumnType::Long),
    ];

    fn to_row(&self) -> Row {
        Row::from([
            (
                SERVICE_INSTANCE_ID.to_string(),
                ColumnValue::Int(self.service_instance_id),
            ),
            (PHASE.to_string(), ColumnValue::Int(self.phase.code())),
            (COUNT.to_string(), ColumnValue::Long(self.count)),
            (
                TIME_BUCKET.to_string(),
                ColumnValue::Long(self.time_bucket.value()),
            ),
        ])
    }

    fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            service_instance_id: row_int(row, SERVICE_INSTANCE_ID)?,
            phase: phase_from_code(row_int(row, PHASE)?)?,
            count: row_long(row, COUNT)?,
            time_bucket: TimeBucket::from_value(row_long(row, TIME_BUCKET)?)?,
        })
    }
}

impl PartialEq for InstanceGcCountIndicator {
    fn eq(&self, other: &Self) -> bool {
        self.service_instance_id == other.service_instance_id
            && self.phase == other.phase
            && self.time_bucket.value() == other.time_bucket.value()
    }
}

impl Eq for InstanceGcCountIndicator {}

impl Hash for InstanceGcCountIndicator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_instance_id.hash(state);
        self.phase.hash(state);
        self.time_bucket.value().hash(state);
    }
}
