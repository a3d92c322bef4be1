// Server-side indicator model: a mergeable aggregate for one dimensional identity and
// one time bucket. The aggregator only works through the `Indicator` capability set.

mod instance_gc;
mod instance_memory;
mod service_relation;
pub mod storage;
pub mod time_bucket;

pub use instance_gc::InstanceGcCountIndicator;
pub use instance_memory::InstanceMemoryIndicator;
pub use service_relation::ServiceCallRelationIndicator;
pub use storage::{Column, ColumnType, ColumnValue, Row, StorageBuilder, StorageError};
pub use time_bucket::{Downsampling, TimeBucket};

use serde::{Deserialize, Serialize};
use std::fmt;
use wincode::{SchemaRead, SchemaWrite};

use crate::models::{RemoteData, RemoteMessage};

/// Separator between the parts of an identity string.
pub const ID_SPLIT: &str = "_";

#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("timestamp {0} out of range")]
    InvalidTimestamp(i64),
    #[error("invalid time bucket {0}")]
    InvalidTimeBucket(i64),
    #[error("remote data has no {slot} slot {index}")]
    MissingSlot { slot: &'static str, index: usize },
    #[error("unknown {field} code {code}")]
    UnknownCode { field: &'static str, code: i32 },
    #[error("cannot combine {left} with {right}")]
    KindMismatch {
        left: IndicatorKind,
        right: IndicatorKind,
    },
}

/// Capability set every concrete indicator kind implements.
///
/// `combine` must be associative and commutative across records sharing an identity.
/// `calculate` must be idempotent. Downsampled copies keep every dimension and measure
/// and only coarsen the time bucket, so `remote_hash_code` is stable across them.
pub trait Indicator: StorageBuilder + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: IndicatorKind;

    fn time_bucket(&self) -> TimeBucket;

    /// Deterministic identity: time bucket then dimensions, joined by [`ID_SPLIT`].
    fn id(&self) -> String;

    /// Merges `other`, which must share this record's identity.
    fn combine(&mut self, other: &Self);

    fn calculate(&mut self);

    /// Copy of this record in `bucket`, a coarser bucket of the same instant.
    fn with_time_bucket(&self, bucket: TimeBucket) -> Self;

    /// Routing hash over the dimensions only; the time bucket is excluded on purpose.
    fn remote_hash_code(&self) -> i32;

    fn serialize(&self) -> RemoteData;

    fn deserialize(data: &RemoteData) -> Result<Self, IndicatorError>;

    fn to_hour(&self) -> Self {
        self.with_time_bucket(self.time_bucket().to_hour())
    }

    fn to_day(&self) -> Self {
        self.with_time_bucket(self.time_bucket().to_day())
    }

    fn to_month(&self) -> Self {
        self.with_time_bucket(self.time_bucket().to_month())
    }

    /// Copy for the next aggregation tier, `None` for month records.
    fn to_coarser(&self) -> Option<Self> {
        let bucket = self.time_bucket();
        bucket
            .downsampling()
            .coarser()
            .map(|target| self.with_time_bucket(bucket.to(target)))
    }
}

/// `17, 31 * h + x` hash fold over the dimensions, wrapping on overflow.
pub(crate) fn hash_fold(parts: &[i32]) -> i32 {
    parts
        .iter()
        .fold(17_i32, |acc, part| acc.wrapping_mul(31).wrapping_add(*part))
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    ServiceCallRelation,
    InstanceMemory,
    InstanceGcCount,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 3] = [
        IndicatorKind::ServiceCallRelation,
        IndicatorKind::InstanceMemory,
        IndicatorKind::InstanceGcCount,
    ];

    pub fn index_name(self) -> &'static str {
        match self {
            IndicatorKind::ServiceCallRelation => ServiceCallRelationIndicator::INDEX_NAME,
            IndicatorKind::InstanceMemory => InstanceMemoryIndicator::INDEX_NAME,
            IndicatorKind::InstanceGcCount => InstanceGcCountIndicator::INDEX_NAME,
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            IndicatorKind::ServiceCallRelation => ServiceCallRelationIndicator::COLUMNS,
            IndicatorKind::InstanceMemory => InstanceMemoryIndicator::COLUMNS,
            IndicatorKind::InstanceGcCount => InstanceGcCountIndicator::COLUMNS,
        }
    }

    pub fn from_index_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.index_name() == name)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index_name())
    }
}

/// Tagged indicator used where records of different kinds share a channel.
#[derive(Debug, Clone)]
pub enum IndicatorRecord {
    ServiceCallRelation(ServiceCallRelationIndicator),
    InstanceMemory(InstanceMemoryIndicator),
    InstanceGcCount(InstanceGcCountIndicator),
}

macro_rules! dispatch {
    ($record:expr, $ind:ident => $body:expr) => {
        match $record {
            IndicatorRecord::ServiceCallRelation($ind) => $body,
            IndicatorRecord::InstanceMemory($ind) => $body,
            IndicatorRecord::InstanceGcCount($ind) => $body,
        }
    };
}

impl IndicatorRecord {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            IndicatorRecord::ServiceCallRelation(_) => IndicatorKind::ServiceCallRelation,
            IndicatorRecord::InstanceMemory(_) => IndicatorKind::InstanceMemory,
            IndicatorRecord::InstanceGcCount(_) => IndicatorKind::InstanceGcCount,
        }
    }

    pub fn id(&self) -> String {
        dispatch!(self, i => i.id())
    }

    pub fn time_bucket(&self) -> TimeBucket {
        dispatch!(self, i => i.time_bucket())
    }

    pub fn distribution_key(&self) -> i32 {
        dispatch!(self, i => i.remote_hash_code())
    }

    pub fn to_row(&self) -> Row {
        dispatch!(self, i => i.to_row())
    }

    pub fn combine(&mut self, other: &IndicatorRecord) -> Result<(), IndicatorError> {
        match (self, other) {
            (IndicatorRecord::ServiceCallRelation(a), IndicatorRecord::ServiceCallRelation(b)) => {
                a.combine(b)
            }
            (IndicatorRecord::InstanceMemory(a), IndicatorRecord::InstanceMemory(b)) => {
                a.combine(b)
            }
            (IndicatorRecord::InstanceGcCount(a), IndicatorRecord::InstanceGcCount(b)) => {
                a.combine(b)
            }
            (left, right) => {
                return Err(IndicatorError::KindMismatch {
                    left: left.kind(),
                    right: right.kind(),
                });
            }
        }
        Ok(())
    }

    pub fn to_remote(&self) -> RemoteMessage {
        RemoteMessage {
            kind: self.kind(),
            data: dispatch!(self, i => i.serialize()),
        }
    }

    pub fn from_remote(message: &RemoteMessage) -> Result<Self, IndicatorError> {
        Ok(match message.kind {
            IndicatorKind::ServiceCallRelation => IndicatorRecord::ServiceCallRelation(
                ServiceCallRelationIndicator::deserialize(&message.data)?,
            ),
            IndicatorKind::InstanceMemory => {
                IndicatorRecord::InstanceMemory(InstanceMemoryIndicator::deserialize(&message.data)?)
            }
            IndicatorKind::InstanceGcCount => IndicatorRecord::InstanceGcCount(
                InstanceGcCountIndicator::deserialize(&message.data)?,
            ),
        })
    }
}

impl From<ServiceCallRelationIndicator> for IndicatorRecord {
    fn from(i: ServiceCallRelationIndicator) -> Self {
        IndicatorRecord::ServiceCallRelation(i)
    }
}

impl From<InstanceMemoryIndicator> for IndicatorRecord {
    fn from(i: InstanceMemoryIndicator) -> Self {
        IndicatorRecord::InstanceMemory(i)
    }
}

impl From<InstanceGcCountIndicator> for IndicatorRecord {
    fn from(i: InstanceGcCountIndicator) -> Self {
        IndicatorRecord::InstanceGcCount(i)
    }
}
