// Shared test helpers
#![allow(dead_code)]

use apm_telemetry::indicator::TimeBucket;
use apm_telemetry::models::*;

/// 2024-01-01T12:30:00Z
pub const T_12_30: i64 = 1_704_112_200_000;

pub fn sample(time: i64) -> MetricSample {
    sample_with_memory(time, 1024)
}

pub fn sample_with_memory(time: i64, resident: u64) -> MetricSample {
    MetricSample {
        time,
        cpu: CpuMetric {
            usage_percent: 12.5,
        },
        memory: vec![
            MemoryMetric {
                area: MemoryArea::Resident,
                used: resident,
                max: 4096,
            },
            MemoryMetric {
                area: MemoryArea::Virtual,
                used: resident * 4,
                max: 0,
            },
        ],
        memory_pools: vec![MemoryPoolMetric {
            pool: PoolType::Physical,
            used: 2048,
            max: 8192,
        }],
        gc: vec![],
    }
}

pub fn bucket(value: i64) -> TimeBucket {
    TimeBucket::from_value(value).unwrap()
}
