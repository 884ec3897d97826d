//! Configuration module
//!
//! Environment-driven configuration for the worker process and the command
//! line tools: database, object storage, external tools, per-queue job
//! settings, the object watcher, the inference runtime and the embedding
//! bridge. A `.env` file is loaded first when present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::QueueName;
use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

const MEDIA_BUCKET: &str = "media";
const PREVIEW_BUCKET: &str = "previews";
const FFMPEG_PATH: &str = "ffmpeg";
const FFPROBE_PATH: &str = "ffprobe";
const PREVIEW_OFFSET_SECS: f64 = crate::constants::PREVIEW_OFFSET_SECS;

const QUEUE_MAX_WORKERS: usize = 4;
const EMBEDDING_QUEUE_MAX_WORKERS: usize = 2;
const QUEUE_TIMEOUT_SECS: u64 = 600;
const JOB_POLL_INTERVAL_MS: u64 = 1000;
const JOB_MAX_ATTEMPTS: i32 = 5;
const JOB_RETRY_BASE_DELAY_SECS: u64 = 1;
const JOB_MAX_BACKOFF_SECS: u64 = 300;
const STALE_JOB_REAP_INTERVAL_SECS: u64 = 60;
const STALE_JOB_GRACE_PERIOD_SECS: u64 = 300;
const JOB_RETENTION_DAYS: i64 = 7;
const SHUTDOWN_GRACE_SECS: u64 = 30;

const WATCHER_POLL_INTERVAL_MS: u64 = 2000;

const INFERENCE_TIMEOUT_SECS: u64 = 30;
const INFERENCE_INPUT_SIZE: u32 = 224;
const EMBEDDING_RATE_LIMIT: f64 = 10.0;

const BRIDGE_POLL_INTERVAL_MS: u64 = 250;
const BRIDGE_MAX_WAIT_SECS: u64 = 30;

/// Settings shared by every Vista process
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

/// Per-queue runner settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_workers: usize,
    pub timeout: Duration,
}

/// Media pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub base: BaseConfig,
    // Object storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub media_bucket: String,
    pub preview_bucket: String,
    // External tools
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub preview_offset_secs: f64,
    // Job queue
    pub worker_queues: Vec<QueueName>,
    pub server_queue: QueueSettings,
    pub media_queue: QueueSettings,
    pub embedding_queue: QueueSettings,
    pub index_queue: QueueSettings,
    pub job_poll_interval_ms: u64,
    pub job_max_attempts: i32,
    pub job_retry_base_delay_secs: u64,
    pub job_max_backoff_secs: u64,
    /// Interval in seconds between runs of the stale job reaper. 0 = disabled.
    pub stale_job_reap_interval_secs: u64,
    /// Added to the queue timeout before a running job is considered stale.
    pub stale_job_grace_period_secs: u64,
    /// Terminal jobs older than this are deleted. 0 = disabled.
    pub job_retention_days: i64,
    pub shutdown_grace_secs: u64,
    // Object watcher
    pub watcher_enabled: bool,
    pub watcher_poll_interval_ms: u64,
    pub watcher_backfill: bool,
    // Inference runtime
    pub inference_endpoint: Option<String>,
    pub inference_timeout_secs: u64,
    pub inference_input_size: u32,
    /// Embedding jobs dispatched per second, per worker process.
    pub embedding_rate_limit: f64,
    // Text embedding bridge
    pub bridge_poll_interval_ms: u64,
    pub bridge_max_wait_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    fn as_pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_pipeline().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = PipelineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        self.as_pipeline()
    }

    pub fn environment(&self) -> &str {
        &self.as_pipeline().base.environment
    }

    pub fn database_url(&self) -> &str {
        &self.as_pipeline().base.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_pipeline().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_pipeline().base.db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_pipeline().storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_pipeline().local_storage_path.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_pipeline().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_pipeline().s3_endpoint.as_deref()
    }

    pub fn media_bucket(&self) -> &str {
        &self.as_pipeline().media_bucket
    }

    pub fn preview_bucket(&self) -> &str {
        &self.as_pipeline().preview_bucket
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.as_pipeline().ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.as_pipeline().ffprobe_path
    }

    pub fn preview_offset_secs(&self) -> f64 {
        self.as_pipeline().preview_offset_secs
    }

    pub fn worker_queues(&self) -> &[QueueName] {
        &self.as_pipeline().worker_queues
    }

    pub fn hosts_queue(&self, queue: QueueName) -> bool {
        self.as_pipeline().worker_queues.contains(&queue)
    }

    pub fn queue_settings(&self, queue: QueueName) -> QueueSettings {
        self.as_pipeline().queue_settings(queue)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.as_pipeline().job_poll_interval_ms)
    }

    pub fn job_max_attempts(&self) -> i32 {
        self.as_pipeline().job_max_attempts
    }

    pub fn job_retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().job_retry_base_delay_secs)
    }

    pub fn job_max_backoff(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().job_max_backoff_secs)
    }

    pub fn stale_job_reap_interval_secs(&self) -> u64 {
        self.as_pipeline().stale_job_reap_interval_secs
    }

    pub fn stale_job_grace_period(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().stale_job_grace_period_secs)
    }

    pub fn job_retention_days(&self) -> i64 {
        self.as_pipeline().job_retention_days
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().shutdown_grace_secs)
    }

    pub fn watcher_enabled(&self) -> bool {
        self.as_pipeline().watcher_enabled
    }

    pub fn watcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.as_pipeline().watcher_poll_interval_ms)
    }

    pub fn watcher_backfill(&self) -> bool {
        self.as_pipeline().watcher_backfill
    }

    pub fn inference_endpoint(&self) -> Option<&str> {
        self.as_pipeline().inference_endpoint.as_deref()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().inference_timeout_secs)
    }

    pub fn inference_input_size(&self) -> u32 {
        self.as_pipeline().inference_input_size
    }

    pub fn embedding_rate_limit(&self) -> f64 {
        self.as_pipeline().embedding_rate_limit
    }

    pub fn bridge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.as_pipeline().bridge_poll_interval_ms)
    }

    pub fn bridge_max_wait(&self) -> Duration {
        Duration::from_secs(self.as_pipeline().bridge_max_wait_secs)
    }
}

/// Parse an environment variable, falling back to `default` when it is unset or
/// malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn queue_settings_from_env(queue: QueueName, default_workers: usize) -> QueueSettings {
    let prefix = queue.as_str().to_uppercase();
    QueueSettings {
        max_workers: env_or(&format!("{}_QUEUE_MAX_WORKERS", prefix), default_workers),
        timeout: Duration::from_secs(env_or(
            &format!("{}_QUEUE_TIMEOUT_SECS", prefix),
            QUEUE_TIMEOUT_SECS,
        )),
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            environment,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let worker_queues = match env::var("WORKER_QUEUES") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(str::parse::<QueueName>)
                .collect::<Result<Vec<_>, _>>()?,
            _ => QueueName::ALL.to_vec(),
        };

        Ok(Self {
            base,
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            media_bucket: env::var("MEDIA_BUCKET").unwrap_or_else(|_| MEDIA_BUCKET.to_string()),
            preview_bucket: env::var("PREVIEW_BUCKET")
                .unwrap_or_else(|_| PREVIEW_BUCKET.to_string()),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| FFMPEG_PATH.to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| FFPROBE_PATH.to_string()),
            preview_offset_secs: env_or("PREVIEW_OFFSET_SECS", PREVIEW_OFFSET_SECS),
            worker_queues,
            server_queue: queue_settings_from_env(QueueName::Server, QUEUE_MAX_WORKERS),
            media_queue: queue_settings_from_env(QueueName::Media, QUEUE_MAX_WORKERS),
            embedding_queue: queue_settings_from_env(
                QueueName::Embedding,
                EMBEDDING_QUEUE_MAX_WORKERS,
            ),
            index_queue: queue_settings_from_env(QueueName::Index, QUEUE_MAX_WORKERS),
            job_poll_interval_ms: env_or("JOB_POLL_INTERVAL_MS", JOB_POLL_INTERVAL_MS),
            job_max_attempts: env_or("JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
            job_retry_base_delay_secs: env_or(
                "JOB_RETRY_BASE_DELAY_SECS",
                JOB_RETRY_BASE_DELAY_SECS,
            ),
            job_max_backoff_secs: env_or("JOB_MAX_BACKOFF_SECS", JOB_MAX_BACKOFF_SECS),
            stale_job_reap_interval_secs: env_or(
                "STALE_JOB_REAP_INTERVAL_SECS",
                STALE_JOB_REAP_INTERVAL_SECS,
            ),
            stale_job_grace_period_secs: env_or(
                "STALE_JOB_GRACE_PERIOD_SECS",
                STALE_JOB_GRACE_PERIOD_SECS,
            ),
            job_retention_days: env_or("JOB_RETENTION_DAYS", JOB_RETENTION_DAYS),
            shutdown_grace_secs: env_or("SHUTDOWN_GRACE_SECS", SHUTDOWN_GRACE_SECS),
            watcher_enabled: env_flag("WATCHER_ENABLED", true),
            watcher_poll_interval_ms: env_or("WATCHER_POLL_INTERVAL_MS", WATCHER_POLL_INTERVAL_MS),
            watcher_backfill: env_flag("WATCHER_BACKFILL", true),
            inference_endpoint: env::var("INFERENCE_ENDPOINT").ok(),
            inference_timeout_secs: env_or("INFERENCE_TIMEOUT_SECS", INFERENCE_TIMEOUT_SECS),
            inference_input_size: env_or("INFERENCE_INPUT_SIZE", INFERENCE_INPUT_SIZE),
            embedding_rate_limit: env_or("EMBEDDING_RATE_LIMIT", EMBEDDING_RATE_LIMIT),
            bridge_poll_interval_ms: env_or("BRIDGE_POLL_INTERVAL_MS", BRIDGE_POLL_INTERVAL_MS),
            bridge_max_wait_secs: env_or("BRIDGE_MAX_WAIT_SECS", BRIDGE_MAX_WAIT_SECS),
        })
    }

    pub fn queue_settings(&self, queue: QueueName) -> QueueSettings {
        match queue {
            QueueName::Server => self.server_queue,
            QueueName::Media => self.media_queue,
            QueueName::Embedding => self.embedding_queue,
            QueueName::Index => self.index_queue,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let url = &self.base.database_url;
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.media_bucket.trim().is_empty() || self.preview_bucket.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "MEDIA_BUCKET and PREVIEW_BUCKET must not be empty"
            ));
        }

        // Previews are stored under the source key.
        if self.media_bucket == self.preview_bucket {
            return Err(anyhow::anyhow!(
                "MEDIA_BUCKET and PREVIEW_BUCKET must be different buckets"
            ));
        }

        if self.worker_queues.is_empty() {
            return Err(anyhow::anyhow!("WORKER_QUEUES must name at least one queue"));
        }

        for queue in &self.worker_queues {
            let settings = self.queue_settings(*queue);
            if settings.max_workers == 0 {
                return Err(anyhow::anyhow!(
                    "{}_QUEUE_MAX_WORKERS must be at least 1",
                    queue.as_str().to_uppercase()
                ));
            }
            if settings.timeout.is_zero() {
                return Err(anyhow::anyhow!(
                    "{}_QUEUE_TIMEOUT_SECS must be greater than 0",
                    queue.as_str().to_uppercase()
                ));
            }
        }

        if self.job_max_attempts < 1 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }

        if self.job_retry_base_delay_secs > self.job_max_backoff_secs {
            return Err(anyhow::anyhow!(
                "JOB_RETRY_BASE_DELAY_SECS must not exceed JOB_MAX_BACKOFF_SECS"
            ));
        }

        if self.job_poll_interval_ms == 0 || self.watcher_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "JOB_POLL_INTERVAL_MS and WATCHER_POLL_INTERVAL_MS must be greater than 0"
            ));
        }

        if self.worker_queues.contains(&QueueName::Embedding) && self.inference_endpoint.is_none()
        {
            return Err(anyhow::anyhow!(
                "INFERENCE_ENDPOINT must be set when this worker hosts the embedding queue"
            ));
        }

        if self.inference_input_size == 0 {
            return Err(anyhow::anyhow!("INFERENCE_INPUT_SIZE must be greater than 0"));
        }

        if self.embedding_rate_limit <= 0.0 {
            return Err(anyhow::anyhow!("EMBEDDING_RATE_LIMIT must be greater than 0"));
        }

        if self.bridge_poll_interval_ms == 0
            || self.bridge_poll_interval_ms >= self.bridge_max_wait_secs * 1000
        {
            return Err(anyhow::anyhow!(
                "BRIDGE_POLL_INTERVAL_MS must be greater than 0 and shorter than BRIDGE_MAX_WAIT_SECS"
            ));
        }

        if self.preview_offset_secs < 0.0 {
            return Err(anyhow::anyhow!("PREVIEW_OFFSET_SECS must not be negative"));
        }

        Ok(())
    }
}
