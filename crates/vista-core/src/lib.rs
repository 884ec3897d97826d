//! Vista Core Library
//!
//! Domain models (media records, search documents, jobs), job error
//! classification, configuration and shared error types used by every Vista
//! crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod job_error;
pub mod models;
pub mod storage_types;
pub mod vector;

// Re-export commonly used types
pub use config::{BaseConfig, Config, PipelineConfig, QueueSettings};
pub use error::{MediaStoreError, StoreError, StoreResult};
pub use job_error::{JobDisposition, JobError, JobResultExt};
pub use storage_types::StorageBackend;
