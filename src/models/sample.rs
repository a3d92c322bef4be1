// One collection tick worth of process readings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetric {
    pub usage_percent: f64,
}

/// Which part of process memory a reading describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryArea {
    Resident,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetric {
    pub area: MemoryArea,
    pub used: u64,
    /// Upper bound for `used`; 0 when the platform reports none.
    pub max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Physical,
    Swap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPoolMetric {
    pub pool: PoolType,
    pub used: u64,
    pub max: u64,
}

/// Collector generation a GC reading belongs to. The integer code is part of the
/// indicator wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcPhase {
    Young,
    Old,
}

impl GcPhase {
    pub fn code(self) -> i32 {
        match self {
            GcPhase::Young => 0,
            GcPhase::Old => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(GcPhase::Young),
            1 => Some(GcPhase::Old),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcMetric {
    pub phase: GcPhase,
    /// Collections since the previous reading.
    pub count: u64,
    pub time_ms: u64,
}

/// Immutable reading set captured once per producer tick. `time` is epoch millis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub time: i64,
    pub cpu: CpuMetric,
    pub memory: Vec<MemoryMetric>,
    pub memory_pools: Vec<MemoryPoolMetric>,
    pub gc: Vec<GcMetric>,
}
