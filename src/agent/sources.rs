// Pull-style measurement sources. Each provider is independently failable; the
// producer treats any failure as "skip this tick".

use std::sync::{Arc, Mutex};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::models::{
    CpuMetric, GcMetric, MemoryArea, MemoryMetric, MemoryPoolMetric, MetricSample, PoolType,
};

pub trait CpuProvider: Send + Sync {
    fn cpu_metric(&self) -> anyhow::Result<CpuMetric>;
}

pub trait MemoryProvider: Send + Sync {
    fn memory_metrics(&self) -> anyhow::Result<Vec<MemoryMetric>>;
}

pub trait MemoryPoolProvider: Send + Sync {
    fn memory_pool_metrics(&self) -> anyhow::Result<Vec<MemoryPoolMetric>>;
}

pub trait GcProvider: Send + Sync {
    fn gc_metrics(&self) -> anyhow::Result<Vec<GcMetric>>;
}

/// The providers one sample is built from.
#[derive(Clone)]
pub struct MeasurementSources {
    pub cpu: Arc<dyn CpuProvider>,
    pub memory: Arc<dyn MemoryProvider>,
    pub memory_pool: Arc<dyn MemoryPoolProvider>,
    pub gc: Arc<dyn GcProvider>,
}

impl MeasurementSources {
    /// Sysinfo-backed CPU, memory and pool readings; no GC readings.
    pub fn system() -> anyhow::Result<Self> {
        let provider = Arc::new(SysinfoProvider::for_current_process()?);
        Ok(Self {
            cpu: provider.clone(),
            memory: provider.clone(),
            memory_pool: provider,
            gc: Arc::new(NoGcProvider),
        })
    }

    /// Queries every provider and builds the sample in one step. Blocking.
    pub fn sample(&self, time: i64) -> anyhow::Result<MetricSample> {
        Ok(MetricSample {
            time,
            cpu: self.cpu.cpu_metric()?,
            memory: self.memory.memory_metrics()?,
            memory_pools: self.memory_pool.memory_pool_metrics()?,
            gc: self.gc.gc_metrics()?,
        })
    }
}

/// For runtimes without a garbage collector.
pub struct NoGcProvider;

impl GcProvider for NoGcProvider {
    fn gc_metrics(&self) -> anyhow::Result<Vec<GcMetric>> {
        Ok(Vec::new())
    }
}

/// Reads the current process and host memory through `sysinfo`.
pub struct SysinfoProvider {
    sys: Mutex<System>,
    pid: Pid,
}

impl SysinfoProvider {
    pub fn for_current_process() -> anyhow::Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow::anyhow!("current pid: {}", e))?;
        let mut sys = System::new();
        sys.refresh_memory();
        // Baseline so the first CPU reading has a previous sample to diff against.
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Ok(Self {
            sys: Mutex::new(sys),
            pid,
        })
    }

    fn refresh_process<R>(
        &self,
        read: impl FnOnce(&sysinfo::Process, &System) -> R,
    ) -> anyhow::Result<R> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        sys.refresh_memory();
        let process = sys
            .process(self.pid)
            .ok_or_else(|| anyhow::anyhow!("process {} not visible to sysinfo", self.pid))?;
        Ok(read(process, &sys))
    }
}

impl CpuProvider for SysinfoProvider {
    fn cpu_metric(&self) -> anyhow::Result<CpuMetric> {
        self.refresh_process(|p, _| CpuMetric {
            usage_percent: f64::from(p.cpu_usage()).max(0.0),
        })
    }
}

impl MemoryProvider for SysinfoProvider {
    fn memory_metrics(&self) -> anyhow::Result<Vec<MemoryMetric>> {
        self.refresh_process(|p, sys| {
            vec![
                MemoryMetric {
                    area: MemoryArea::Resident,
                    used: p.memory(),
                    max: sys.total_memory(),
                },
                MemoryMetric {
                    area: MemoryArea::Virtual,
                    used: p.virtual_memory(),
                    max: 0,
                },
            ]
        })
    }
}

impl MemoryPoolProvider for SysinfoProvider {
    fn memory_pool_metrics(&self) -> anyhow::Result<Vec<MemoryPoolMetric>> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
        sys.refresh_memory();
        Ok(vec![
            MemoryPoolMetric {
                pool: PoolType::Physical,
                used: sys.used_memory(),
                max: sys.total_memory(),
            },
            MemoryPoolMetric {
                pool: PoolType::Swap,
                used: sys.used_swap(),
                max: sys.total_swap(),
            },
        ])
    }
}
