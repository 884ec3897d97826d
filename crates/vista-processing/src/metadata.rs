//! Structural metadata produced by the probes

use serde::{Deserialize, Serialize};

/// Header-level image metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Lowercase format name, e.g. `png`, `jpeg`.
    pub format: String,
    pub width: u32,
    pub height: u32,
}

/// Container metadata extracted from ffprobe output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// First entry of the container's `format_name`, e.g. `mov` for `mov,mp4,m4a`.
    pub format: String,
    /// Maximum width across video streams, 0 without video.
    pub width: u32,
    /// Maximum height across video streams, 0 without video.
    pub height: u32,
    pub duration: Option<f64>,
    pub has_video: bool,
}
