//! Rate limiting service
//!
//! Token buckets keyed by job kind, acquired by queue runners before a job
//! is handed to its handler.

pub use limiter::RateLimiter;

mod limiter;
