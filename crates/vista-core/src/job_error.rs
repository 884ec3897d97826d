//! Job execution error types
//!
//! A handler failure carries its disposition: `Retry` reschedules the job with
//! backoff until its attempts are exhausted, `Cancel` finalizes it as
//! cancelled after a single attempt regardless of the remaining budget.

use std::fmt;

/// What the runner should do with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Retry,
    Cancel,
}

/// Job execution error that is either retryable or permanent.
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    disposition: JobDisposition,
}

impl JobError {
    /// Create a retryable job error.
    ///
    /// Use for transient failures: tool launch errors, broken pipes, storage
    /// or database errors, inference runtime hiccups.
    pub fn retry(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            disposition: JobDisposition::Retry,
        }
    }

    /// Create a permanent job error.
    ///
    /// Use for input that will never succeed: undecodable media, unsupported
    /// formats, malformed arguments.
    pub fn cancel(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            disposition: JobDisposition::Cancel,
        }
    }

    pub fn disposition(&self) -> JobDisposition {
        self.disposition
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition == JobDisposition::Retry
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Unclassified failures are retried.
    fn from(err: anyhow::Error) -> Self {
        Self::retry(err)
    }
}

/// Extension trait for Result to classify failures as permanent.
pub trait JobResultExt<T> {
    /// Mark this result as cancelling the job on error
    fn cancel_on_err(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn cancel_on_err(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::cancel(e.into()))
    }
}
