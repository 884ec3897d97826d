//! Well-known names shared by the pipeline stages.

/// Date name attached to every media record at ingestion time.
pub const UPLOAD_DATE: &str = "upload";

/// Tag attached to every freshly ingested media record.
pub const TAGME_TAG: &str = "tagme";

/// Vector space populated by the image embedding stage.
pub const VISION_SPACE: &str = "vision";

/// Offset (seconds) at which video previews are captured.
pub const PREVIEW_OFFSET_SECS: f64 = 2.0;
