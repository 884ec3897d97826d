//! Vista pipeline
//!
//! The stage workers that turn a freshly stored object into an analyzed,
//! embedded and indexed media record, the request/response bridge used for
//! on-demand text embeddings, similarity ranking, and the consistency hook
//! that keeps the search index in step with relational edits.
//!
//! Control flow: the object watcher ([`ingest`]) enqueues `analyze_media`;
//! the analyze worker persists the record and enqueues `embed_media` and
//! `index_media`, which run independently of each other.

pub mod bridge;
pub mod dispatch;
pub mod hooks;
pub mod ingest;
pub mod pipeline;
pub mod ranker;
pub mod setup;
pub mod state;
pub mod workers;

#[cfg(test)]
mod test_support;

pub use bridge::{BridgeConfig, EmbeddingBridge, EmbeddingRequestError};
pub use dispatch::PipelineDispatcher;
pub use hooks::{EditError, MediaChangeHook, MediaEditor, SearchIndexHook};
pub use ingest::{ingest_event, run_watcher};
pub use pipeline::Pipeline;
pub use ranker::SimilarityRanker;
pub use setup::setup_pipeline;
pub use state::{PipelineSettings, PipelineState};
pub use workers::JobHandler;
