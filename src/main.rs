use anyhow::Result;
use apm_telemetry::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use agent::{
    AgentLoopConfig, BatchDispatcher, BoundedSampleQueue, ConnectionStatusMonitor,
    DispatcherConfig, MetricProducer, RegistrationState,
};
use aggregation::worker::{WorkerPoolConfig, spawn_workers};
use storage_repo::retention::{self, RetentionConfig};
use storage_repo::writer::{IndicatorWriterConfig, spawn_indicator_writer, writer_channel_capacity};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    // Collector: repo, writer, aggregation pool, retention.
    let repo = Arc::new(storage_repo::IndicatorRepo::connect(&app_config.storage.path).await?);
    repo.init().await?;

    let records_saved_total = Arc::new(AtomicU64::new(0));
    let (persist_tx, persist_rx) =
        mpsc::channel(writer_channel_capacity(app_config.storage.flush_rate));
    let writer_handle = spawn_indicator_writer(
        persist_rx,
        repo.clone(),
        IndicatorWriterConfig {
            flush_rate: app_config.storage.flush_rate,
            flush_interval_secs: app_config.storage.flush_interval_secs,
        },
        records_saved_total.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (router, worker_handles) = spawn_workers(
        WorkerPoolConfig {
            workers: app_config.aggregation.workers,
            channel_capacity: app_config.aggregation.channel_capacity,
            flush_interval_secs: app_config.aggregation.flush_interval_secs,
            flush_grace_secs: app_config.aggregation.flush_grace_secs,
        },
        persist_tx,
        shutdown_rx.clone(),
    );

    let retention_handle = retention::spawn(
        repo.clone(),
        RetentionConfig {
            minute_retention_hours: app_config.storage.minute_retention_hours,
            hour_retention_days: app_config.storage.hour_retention_days,
            day_retention_days: app_config.storage.day_retention_days,
            prune_schedule: app_config.storage.prune_schedule.clone(),
            prune_interval_secs: app_config.storage.prune_interval_secs,
        },
        shutdown_rx.clone(),
    );

    // Agent: samples this process and ships batches over the in-process transport.
    let monitor = Arc::new(ConnectionStatusMonitor::new());
    let registration = Arc::new(RegistrationState::new());
    let queue = Arc::new(BoundedSampleQueue::new(app_config.agent.buffer_size));
    let producer = Arc::new(MetricProducer::new(
        queue.clone(),
        registration.clone(),
        agent::sources::MeasurementSources::system()?,
    )
    .with_collect_timeout(std::time::Duration::from_millis(
        app_config.agent.collect_interval_ms,
    )));
    let channel = loopback::LoopbackChannel::new(monitor.clone(), router.clone());
    let dispatcher = Arc::new(BatchDispatcher::new(
        queue.clone(),
        registration.clone(),
        Arc::new(channel.clone()),
        DispatcherConfig {
            send_timeout: std::time::Duration::from_millis(app_config.agent.send_timeout_ms),
            discard_while_disconnected: app_config.agent.discard_while_disconnected,
        },
    ));
    dispatcher.attach(&monitor);

    registration.set_application_id(app_config.agent.application_id);
    registration.set_instance_id(app_config.agent.instance_id);
    channel.connect();

    let loop_config = AgentLoopConfig {
        collect_interval_ms: app_config.agent.collect_interval_ms,
        send_interval_ms: app_config.agent.send_interval_ms,
        stats_log_interval_secs: app_config.agent.stats_log_interval_secs,
    };
    let producer_handle = agent::spawn_producer(producer.clone(), &loop_config, shutdown_rx.clone());
    let dispatcher_handle = agent::spawn_dispatcher(
        dispatcher,
        producer,
        queue,
        &loop_config,
        shutdown_rx,
    );

    let app = routes::app(router, repo);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop ticks first, then let workers drain into the writer, then the final flush.
    tracing::info!("Received shutdown signal");
    channel.disconnect();
    let _ = shutdown_tx.send(true);
    let _ = producer_handle.await;
    let _ = dispatcher_handle.await;
    let _ = retention_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = writer_handle.await;
    tracing::info!(
        records_saved_total = records_saved_total.load(Ordering::Relaxed),
        "shutdown complete"
    );

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
