//! Video/audio probing module

pub mod probe_output;
pub mod processor;

pub use probe_output::parse_probe_output;
pub use processor::{FfmpegProber, Prober};
