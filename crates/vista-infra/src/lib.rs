//! Vista Infrastructure Library
//!
//! Shared infrastructure used by the worker and CLI binaries:
//! - Telemetry initialization (tracing subscriber)
//! - Per-job-kind rate limiting

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

#[cfg(feature = "rate-limit")]
pub use rate_limit::RateLimiter;
