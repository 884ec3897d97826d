use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Named queue. Each queue has its own runner and concurrency limit, so a
/// saturated stage cannot starve the others.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Server,
    Media,
    Embedding,
    Index,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Server,
        QueueName::Media,
        QueueName::Embedding,
        QueueName::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Server => "server",
            QueueName::Media => "media",
            QueueName::Embedding => "embedding",
            QueueName::Index => "index",
        }
    }

    /// Postgres NOTIFY channel used to wake runners of this queue.
    pub fn notify_channel(&self) -> String {
        format!("vista_jobs_{}", self.as_str())
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "server" => Ok(QueueName::Server),
            "media" => Ok(QueueName::Media),
            "embedding" => Ok(QueueName::Embedding),
            "index" => Ok(QueueName::Index),
            _ => Err(anyhow::anyhow!("Invalid queue name: {}", s)),
        }
    }
}

/// Payload discriminator of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    AnalyzeMedia,
    EmbedMedia,
    EmbedText,
    IndexMedia,
    ReindexAll,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::AnalyzeMedia,
        JobKind::EmbedMedia,
        JobKind::EmbedText,
        JobKind::IndexMedia,
        JobKind::ReindexAll,
    ];

    /// Queue a job of this kind is routed to unless the caller overrides it.
    pub fn default_queue(&self) -> QueueName {
        match self {
            JobKind::AnalyzeMedia => QueueName::Media,
            JobKind::EmbedMedia | JobKind::EmbedText => QueueName::Embedding,
            JobKind::IndexMedia => QueueName::Index,
            JobKind::ReindexAll => QueueName::Server,
        }
    }
}

impl Display for JobKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobKind::AnalyzeMedia => write!(f, "analyze_media"),
            JobKind::EmbedMedia => write!(f, "embed_media"),
            JobKind::EmbedText => write!(f, "embed_text"),
            JobKind::IndexMedia => write!(f, "index_media"),
            JobKind::ReindexAll => write!(f, "reindex_all"),
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze_media" => Ok(JobKind::AnalyzeMedia),
            "embed_media" => Ok(JobKind::EmbedMedia),
            "embed_text" => Ok(JobKind::EmbedText),
            "index_media" => Ok(JobKind::IndexMedia),
            "reindex_all" => Ok(JobKind::ReindexAll),
            _ => Err(anyhow::anyhow!("Invalid job kind: {}", s)),
        }
    }
}

/// Lifecycle state of a job.
///
/// `available -> running -> {completed | retryable -> available | discarded | cancelled}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_state", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Available,
    Running,
    Completed,
    Retryable,
    Discarded,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discarded | JobState::Cancelled
        )
    }

    /// States a runner may claim from once `scheduled_at` has passed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobState::Available | JobState::Retryable)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobState::Available => write!(f, "available"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Retryable => write!(f, "retryable"),
            JobState::Discarded => write!(f, "discarded"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(JobState::Available),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "retryable" => Ok(JobState::Retryable),
            "discarded" => Ok(JobState::Discarded),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// One entry of a job's error history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAttemptError {
    pub attempt: i32,
    pub at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: QueueName,
    pub kind: JobKind,
    pub args: serde_json::Value,
    pub state: JobState,
    /// Number of times the job has been claimed, including the current run.
    pub attempt: i32,
    pub max_attempts: i32,
    pub output: Option<serde_json::Value>,
    pub errors: Vec<JobAttemptError>,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let errors: serde_json::Value = row.get("errors");
        Ok(Job {
            id: row.get("id"),
            queue: row.get::<String, _>("queue").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse queue: {}", e).into())
            })?,
            kind: row.get::<String, _>("kind").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job kind: {}", e).into())
            })?,
            args: row.get("args"),
            state: row.get("state"),
            attempt: row.get("attempt"),
            max_attempts: row.get("max_attempts"),
            output: row.get("output"),
            errors: serde_json::from_value(errors).map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse job errors: {}", e).into())
            })?,
            scheduled_at: row.get("scheduled_at"),
            attempted_at: row.get("attempted_at"),
            finalized_at: row.get("finalized_at"),
            created_at: row.get("created_at"),
        })
    }
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Most recent error message recorded for this job.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|e| e.error.as_str())
    }

    /// Decode the arguments as a typed struct.
    pub fn args_as<A: JobArgs>(&self) -> Result<A, serde_json::Error> {
        serde_json::from_value(self.args.clone())
    }

    /// Decode the output, if one was recorded.
    pub fn output_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.output
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
    }
}

/// Typed job arguments bound to a job kind.
pub trait JobArgs: Serialize + DeserializeOwned {
    fn kind() -> JobKind;
}

/// Options accepted by enqueue.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub queue: Option<QueueName>,
    pub max_attempts: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn queue(mut self, queue: QueueName) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Fully resolved insert handed to a job store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: QueueName,
    pub kind: JobKind,
    pub args: serde_json::Value,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeMediaArgs {
    pub key: String,
    pub content_type: String,
}

impl JobArgs for AnalyzeMediaArgs {
    fn kind() -> JobKind {
        JobKind::AnalyzeMedia
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedMediaArgs {
    pub bucket: String,
    pub key: String,
}

impl JobArgs for EmbedMediaArgs {
    fn kind() -> JobKind {
        JobKind::EmbedMedia
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMediaArgs {
    pub media_id: String,
}

impl JobArgs for IndexMediaArgs {
    fn kind() -> JobKind {
        JobKind::IndexMedia
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextEmbeddingArgs {
    pub text: String,
    pub space: String,
}

impl JobArgs for TextEmbeddingArgs {
    fn kind() -> JobKind {
        JobKind::EmbedText
    }
}

/// Output recorded by the text embedding worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextEmbedding {
    pub vector: Vec<f32>,
    pub space: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReindexAllArgs {}

impl JobArgs for ReindexAllArgs {
    fn kind() -> JobKind {
        JobKind::ReindexAll
    }
}
