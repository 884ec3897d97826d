//! In-process implementations of the store traits.
//!
//! Used by tests and by single-process deployments that do not need
//! durability. They follow the same state transitions and error semantics as
//! the Postgres stores.

pub mod job;
pub mod media;
pub mod reconcile;
pub mod search;

pub use job::MemoryJobStore;
pub use media::MemoryMediaStore;
pub use reconcile::MemorySearchReconciler;
pub use search::MemorySearchIndex;
