//! Store abstractions used by the job queue and the pipeline stages.
//!
//! Each trait has a Postgres implementation in [`crate::db`] and an in-memory
//! implementation in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use vista_core::models::{
    Job, JobAttemptError, Media, MediaRecord, NewJob, NewMedia, QueueName, SearchDocument,
};
use vista_core::StoreResult;

/// Durable job storage with per-queue claiming.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job in state `available` and wake runners of its queue.
    async fn enqueue(&self, job: NewJob) -> StoreResult<Job>;

    /// Claim the oldest claimable job of `queue` whose `scheduled_at` has
    /// passed. The job moves to `running` and its attempt counter increments.
    /// A job is handed to at most one caller.
    async fn claim(&self, queue: QueueName) -> StoreResult<Option<Job>>;

    /// `running -> completed`, recording the handler output.
    async fn complete(&self, id: Uuid, output: Option<serde_json::Value>) -> StoreResult<Job>;

    /// `running -> retryable` at `retry_at`, or `running -> discarded` when the
    /// job has used all of its attempts. The error is appended to the history.
    async fn retry(
        &self,
        id: Uuid,
        error: JobAttemptError,
        retry_at: DateTime<Utc>,
    ) -> StoreResult<Job>;

    /// `running -> cancelled`, regardless of remaining attempts.
    async fn cancel(&self, id: Uuid, error: JobAttemptError) -> StoreResult<Job>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Remove a job row. Returns whether a row was deleted.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Return `running` jobs of `queue` attempted before `stale_before` to
    /// `retryable` (or `discarded` when out of attempts). Returns the number of
    /// jobs touched.
    async fn reap_stale(&self, queue: QueueName, stale_before: DateTime<Utc>) -> StoreResult<u64>;

    /// Delete terminal jobs finalized before `before`.
    async fn delete_finished_before(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    /// Forward a wake-up into `tx` whenever a job is enqueued on `queue`.
    ///
    /// Runs in a background task until `tx` is closed. Runners also poll, so a
    /// missed wake-up only delays a job by one poll interval.
    async fn listen(&self, queue: QueueName, tx: mpsc::Sender<()>) -> StoreResult<()>;
}

/// Relational media records with their tags and named dates.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Insert a media row and attach `tags` and `dates` in a single
    /// transaction. Tag and date names are found or created. A second insert
    /// with the same id fails with `StoreError::AlreadyExists`.
    async fn create_media(
        &self,
        media: NewMedia,
        tags: &[&str],
        dates: &[(&str, DateTime<Utc>)],
    ) -> StoreResult<Media>;

    async fn exists(&self, id: &str) -> StoreResult<bool>;

    async fn get(&self, id: &str) -> StoreResult<Option<Media>>;

    /// Fetch the given ids. Missing ids are skipped; order is unspecified.
    async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Media>>;

    /// The media row with its sorted tag names and date map.
    async fn get_record(&self, id: &str) -> StoreResult<Option<MediaRecord>>;

    /// Attach tags (found or created). `StoreError::NotFound` if the media is missing.
    async fn add_tags(&self, id: &str, tags: &[String]) -> StoreResult<()>;

    /// Detach tags. Tags themselves are never deleted.
    async fn remove_tags(&self, id: &str, tags: &[String]) -> StoreResult<()>;

    /// Set (or overwrite) a named date. `StoreError::NotFound` if the media is missing.
    async fn set_date(&self, id: &str, name: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Delete a media row with its edges and vectors. Returns whether it existed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Media ids in ascending order, starting after `after`.
    async fn list_ids(&self, after: Option<&str>, limit: i64) -> StoreResult<Vec<String>>;
}

/// Embedding vectors keyed by (media id, vector space).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Delete every vector of `media_id`, then insert `vectors`, atomically.
    /// `StoreError::NotFound` if the media row does not exist.
    async fn replace_vectors(
        &self,
        media_id: &str,
        vectors: Vec<(String, Vec<f32>)>,
    ) -> StoreResult<()>;

    async fn get_vector(&self, media_id: &str, space: &str) -> StoreResult<Option<Vec<f32>>>;

    /// Media ids of `space` ordered by ascending cosine distance to `vector`.
    async fn nearest(
        &self,
        space: &str,
        vector: &[f32],
        limit: i64,
        exclude_id: Option<&str>,
    ) -> StoreResult<Vec<String>>;
}

/// Full-text search engine holding [`SearchDocument`]s.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert(&self, document: &SearchDocument) -> StoreResult<()>;

    /// Remove a document. Removing a missing document is not an error.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<SearchDocument>>;

    /// Ids of matching documents, best match first.
    async fn query(&self, expression: &str, limit: i64) -> StoreResult<Vec<String>>;
}

/// Outcome of a search document reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The record exists and its document was written.
    Upserted,
    /// The record is gone and its document was removed (or never existed).
    Deleted,
}

/// Keeps the search index a projection of the media records.
#[async_trait]
pub trait SearchReconciler: Send + Sync {
    /// Reload the record of `media_id` and upsert its projection, or drop the
    /// document when the record is gone.
    ///
    /// Runs for the same id are serialized, so a projection read before an
    /// edit can never be written after the projection of that edit. Callers
    /// reconcile after their edit commits.
    async fn reconcile(&self, media_id: &str) -> StoreResult<Reconciled>;
}
