use std::str::FromStr;

use serde::Deserialize;

use crate::aggregation::worker::MAX_GRACE_SECS;
use crate::storage_repo::retention::MAX_RETENTION_DAYS;
use crate::storage_repo::writer::MAX_FLUSH_RATE;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Samples retained while the transport is unavailable (drop-oldest beyond this).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_interval_ms")]
    pub collect_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub send_interval_ms: u64,
    /// Must not exceed send_interval_ms.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Identity the standalone binary registers with.
    pub application_id: i32,
    pub instance_id: i32,
    #[serde(default)]
    pub discard_while_disconnected: bool,
    /// How often to log agent stats (queue depth, evictions, sends) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

/// 60 samples per minute, ten minutes of backlog.
fn default_buffer_size() -> usize {
    60 * 10
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_send_timeout_ms() -> u64 {
    800
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Late-arrival allowance after a bucket's window ends.
    #[serde(default = "default_flush_grace_secs")]
    pub flush_grace_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            channel_capacity: default_channel_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
            flush_grace_secs: default_flush_grace_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_flush_grace_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: String,
    pub flush_rate: u64,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_minute_retention_hours")]
    pub minute_retention_hours: u32,
    #[serde(default = "default_hour_retention_days")]
    pub hour_retention_days: u32,
    #[serde(default = "default_day_retention_days")]
    pub day_retention_days: u32,
    /// Optional cron expression (seconds field first). Uses local time.
    #[serde(default)]
    pub prune_schedule: Option<String>,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_minute_retention_hours() -> u32 {
    24
}

fn default_hour_retention_days() -> u32 {
    7
}

fn default_day_retention_days() -> u32 {
    90
}

fn default_prune_interval_secs() -> u64 {
    3600
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.agent.buffer_size > 0,
            "agent.buffer_size must be > 0, got {}",
            self.agent.buffer_size
        );
        anyhow::ensure!(
            self.agent.collect_interval_ms > 0,
            "agent.collect_interval_ms must be > 0, got {}",
            self.agent.collect_interval_ms
        );
        anyhow::ensure!(
            self.agent.send_interval_ms > 0,
            "agent.send_interval_ms must be > 0, got {}",
            self.agent.send_interval_ms
        );
        anyhow::ensure!(
            self.agent.send_timeout_ms > 0
                && self.agent.send_timeout_ms <= self.agent.send_interval_ms,
            "agent.send_timeout_ms must be in 1..={} (agent.send_interval_ms), got {}",
            self.agent.send_interval_ms,
            self.agent.send_timeout_ms
        );
        anyhow::ensure!(
            self.agent.application_id > 0,
            "agent.application_id must be > 0, got {}",
            self.agent.application_id
        );
        anyhow::ensure!(
            self.agent.instance_id > 0,
            "agent.instance_id must be > 0, got {}",
            self.agent.instance_id
        );
        anyhow::ensure!(
            self.agent.stats_log_interval_secs > 0,
            "agent.stats_log_interval_secs must be > 0, got {}",
            self.agent.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.aggregation.workers > 0,
            "aggregation.workers must be > 0, got {}",
            self.aggregation.workers
        );
        anyhow::ensure!(
            self.aggregation.channel_capacity > 0,
            "aggregation.channel_capacity must be > 0, got {}",
            self.aggregation.channel_capacity
        );
        anyhow::ensure!(
            self.aggregation.flush_interval_secs > 0,
            "aggregation.flush_interval_secs must be > 0, got {}",
            self.aggregation.flush_interval_secs
        );
        anyhow::ensure!(
            self.aggregation.flush_grace_secs <= MAX_GRACE_SECS,
            "aggregation.flush_grace_secs must be <= {}, got {}",
            MAX_GRACE_SECS,
            self.aggregation.flush_grace_secs
        );
        anyhow::ensure!(
            !self.storage.path.is_empty(),
            "storage.path must be non-empty"
        );
        anyhow::ensure!(
            (1..=MAX_FLUSH_RATE).contains(&self.storage.flush_rate),
            "storage.flush_rate must be in 1..={}, got {}",
            MAX_FLUSH_RATE,
            self.storage.flush_rate
        );
        anyhow::ensure!(
            self.storage.flush_interval_secs > 0,
            "storage.flush_interval_secs must be > 0, got {}",
            self.storage.flush_interval_secs
        );
        anyhow::ensure!(
            (1..=MAX_RETENTION_DAYS * 24).contains(&self.storage.minute_retention_hours),
            "storage.minute_retention_hours must be in 1..={}, got {}",
            MAX_RETENTION_DAYS * 24,
            self.storage.minute_retention_hours
        );
        anyhow::ensure!(
            (1..=MAX_RETENTION_DAYS).contains(&self.storage.hour_retention_days),
            "storage.hour_retention_days must be in 1..={}, got {}",
            MAX_RETENTION_DAYS,
            self.storage.hour_retention_days
        );
        anyhow::ensure!(
            (1..=MAX_RETENTION_DAYS).contains(&self.storage.day_retention_days),
            "storage.day_retention_days must be in 1..={}, got {}",
            MAX_RETENTION_DAYS,
            self.storage.day_retention_days
        );
        anyhow::ensure!(
            self.storage.prune_interval_secs > 0,
            "storage.prune_interval_secs must be > 0, got {}",
            self.storage.prune_interval_secs
        );
        if let Some(ref schedule) = self.storage.prune_schedule {
            anyhow::ensure!(
                cron::Schedule::from_str(schedule).is_ok(),
                "storage.prune_schedule is not a valid cron expression: {}",
                schedule
            );
        }
        Ok(())
    }
}
