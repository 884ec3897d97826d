//! Vista persistence layer
//!
//! Store traits for jobs, media records, vectors and the search projection,
//! with Postgres implementations (sqlx + pgvector) and in-memory ones.

pub mod db;
pub mod memory;
pub mod traits;

pub use db::transaction::TransactionGuard;
pub use db::{
    run_migrations, setup_database, PgJobStore, PgMediaStore, PgSearchIndex, PgSearchReconciler,
    PgVectorStore,
};
pub use memory::{MemoryJobStore, MemoryMediaStore, MemorySearchIndex, MemorySearchReconciler};
pub use traits::{JobStore, MediaStore, Reconciled, SearchIndex, SearchReconciler, VectorStore};
