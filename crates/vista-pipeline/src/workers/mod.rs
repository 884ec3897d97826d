//! Stage workers
//!
//! Each worker handles one job kind. Failures are classified at the point
//! where the cause is known: bad input (undecodable media, unsupported
//! formats, malformed arguments, constraint violations) cancels the job,
//! everything that may go away on its own (tool launches, storage, database
//! connectivity, inference) is retried.

pub mod analyze;
pub mod embed;
pub mod index;
pub mod reindex;
pub mod text_embedding;

use async_trait::async_trait;
use std::fmt::Display;

use vista_core::models::{Job, JobArgs};
use vista_core::{JobError, StoreError};
use vista_inference::InferenceError;
use vista_processing::{DecodeError, ProbeError};
use vista_storage::StorageError;

use crate::state::PipelineState;

pub use analyze::AnalyzeWorker;
pub use embed::EmbedWorker;
pub use index::IndexWorker;
pub use reindex::ReindexWorker;
pub use text_embedding::TextEmbeddingWorker;

/// Handler for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a claimed job. `Ok(output)` completes it.
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError>;
}

fn classify<E>(err: E, retryable: bool, context: impl Display) -> JobError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let err = anyhow::Error::new(err).context(context.to_string());
    if retryable {
        JobError::retry(err)
    } else {
        JobError::cancel(err)
    }
}

/// Arguments that do not decode will never decode.
pub(crate) fn parse_args<A: JobArgs>(job: &Job) -> Result<A, JobError> {
    job.args_as::<A>()
        .map_err(|e| classify(e, false, format!("invalid {} arguments", job.kind)))
}

pub(crate) fn store_failure(err: StoreError, context: impl Display) -> JobError {
    let retryable = err.is_transient();
    classify(err, retryable, context)
}

/// A missing object or an invalid key cannot be fixed by retrying.
pub(crate) fn storage_failure(err: StorageError, context: impl Display) -> JobError {
    let retryable = !matches!(
        err,
        StorageError::NotFound(_) | StorageError::InvalidKey(_) | StorageError::UnknownBucket(_)
    );
    classify(err, retryable, context)
}

pub(crate) fn decode_failure(err: DecodeError, context: impl Display) -> JobError {
    let retryable = err.is_retryable();
    classify(err, retryable, context)
}

pub(crate) fn probe_failure(err: ProbeError, context: impl Display) -> JobError {
    let retryable = err.is_retryable();
    classify(err, retryable, context)
}

pub(crate) fn inference_failure(err: InferenceError, context: impl Display) -> JobError {
    let retryable = err.is_retryable();
    classify(err, retryable, context)
}
