//! Vista job execution
//!
//! One [`QueueRunner`] per hosted queue claims jobs from a [`vista_db::JobStore`]
//! and hands them to a [`JobDispatcher`], bounded by that queue's worker
//! limit. Failures are rescheduled with exponential backoff or finalized
//! according to their [`vista_core::JobError`] disposition. [`WorkerPool`]
//! starts the runners for a process together with the maintenance sweeps and
//! coordinates shutdown.

pub mod client;
pub mod context;
pub mod maintenance;
pub mod pool;
pub mod queue;

pub use client::JobClient;
pub use context::JobDispatcher;
pub use maintenance::{run_maintenance, MaintenanceConfig};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use queue::{compute_retry_backoff, QueueRunner, QueueRunnerConfig};
