//! Job dispatch trait
//!
//! The pipeline implements this trait for its set of stage workers. A runner
//! calls `dispatch` for every job it claims; the implementation matches on the
//! job kind and invokes the matching worker.

use async_trait::async_trait;

use vista_core::models::Job;
use vista_core::JobError;

/// Routes a claimed job to its handler.
///
/// `Ok(output)` completes the job and records `output`. An `Err` is retried or
/// cancelled according to [`JobError::disposition`].
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &Job) -> Result<Option<serde_json::Value>, JobError>;
}
