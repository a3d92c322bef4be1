// Wire and value models shared by the agent and the collector

mod batch;
mod remote;
mod sample;

pub use batch::{MetricBatch, ServiceCallObservation};
pub use remote::{RemoteData, RemoteMessage};
pub use sample::{
    CpuMetric, GcMetric, GcPhase, MemoryArea, MemoryMetric, MemoryPoolMetric, MetricSample,
    PoolType,
};
