// In-process transport: the standalone binary's agent delivers batches straight into the
// local aggregation pool. Each connect starts a new generation; handles from an older
// generation fail with StaleHandle so the dispatcher must rebuild after a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;

use crate::agent::status::{ConnectionStatus, ConnectionStatusMonitor};
use crate::agent::transport::{MetricsClient, TransportChannel, TransportError};
use crate::aggregation::ingest::indicators_from_batch;
use crate::aggregation::worker::WorkerRouter;
use crate::models::MetricBatch;

struct Shared {
    monitor: Arc<ConnectionStatusMonitor>,
    router: WorkerRouter,
    generation: AtomicU64,
}

impl Shared {
    fn check(&self, generation: u64) -> Result<(), TransportError> {
        if self.monitor.status() != ConnectionStatus::Connected {
            return Err(TransportError::NotConnected);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            return Err(TransportError::StaleHandle);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct LoopbackChannel {
    shared: Arc<Shared>,
}

impl LoopbackChannel {
    pub fn new(monitor: Arc<ConnectionStatusMonitor>, router: WorkerRouter) -> Self {
        Self {
            shared: Arc::new(Shared {
                monitor,
                router,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Walks the monitor through `Connecting` to `Connected` under a fresh generation.
    pub fn connect(&self) {
        self.shared.monitor.transition(ConnectionStatus::Connecting);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.monitor.transition(ConnectionStatus::Connected);
    }

    pub fn disconnect(&self) {
        self.shared.monitor.transition(ConnectionStatus::Disconnected);
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }
}

impl TransportChannel for LoopbackChannel {
    fn client(&self) -> Result<Arc<dyn MetricsClient>, TransportError> {
        let generation = self.generation();
        self.shared.check(generation)?;
        Ok(Arc::new(LoopbackClient {
            shared: self.shared.clone(),
            generation,
        }))
    }
}

pub struct LoopbackClient {
    shared: Arc<Shared>,
    generation: u64,
}

impl MetricsClient for LoopbackClient {
    fn collect(&self, batch: MetricBatch) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.shared.check(self.generation)?;
            let records = indicators_from_batch(&batch);
            self.shared
                .router
                .route_all(records)
                .await
                .map(|_| ())
                .map_err(|e| TransportError::Rejected(e.to_string()))
        })
    }
}
