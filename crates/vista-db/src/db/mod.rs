//! Postgres implementations of the store traits.
//
// Job queue table (claiming, retries, LISTEN/NOTIFY wake-ups)
pub mod job;
//
// Media records, tags and named dates
pub mod media;
//
// Full-text search projection
pub mod search;
//
// Pool construction and migrations
pub mod setup;
//
// Transaction utilities
pub mod transaction;
//
// pgvector embeddings
pub mod vector;

pub use job::PgJobStore;
pub use media::PgMediaStore;
pub use search::{PgSearchIndex, PgSearchReconciler};
pub use setup::{run_migrations, setup_database};
pub use vector::PgVectorStore;
