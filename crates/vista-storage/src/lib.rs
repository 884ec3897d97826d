//! Vista Storage Library
//!
//! Object storage abstraction over named buckets, with a local filesystem
//! backend and an S3-compatible backend, plus the bucket watcher that turns
//! newly stored objects into notifications.
//!
//! # Key format
//!
//! Keys are opaque, content-derived names (for example the SHA-256 of the
//! upload plus an extension). They must not contain `..`, a leading `/` or a
//! NUL byte. Validation is centralized in the `keys` module so all backends
//! stay consistent.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod watch;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, ObjectInfo, Storage, StorageError, StorageResult};
pub use vista_core::StorageBackend;
pub use watch::{watch_bucket, ObjectEvent, WatchRetry};
