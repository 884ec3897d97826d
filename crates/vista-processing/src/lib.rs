//! Media probing and pre-processing
//!
//! - Image header inspection and model input preparation (`image`)
//! - ffprobe metadata and ffmpeg preview extraction (`video`)

pub mod error;
pub mod metadata;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "video")]
pub mod video;

pub use error::{DecodeError, ProbeError};
pub use metadata::{ImageMetadata, ProbeReport};

#[cfg(feature = "image")]
pub use image::{preprocess, read_header};

#[cfg(feature = "video")]
pub use video::{FfmpegProber, Prober};
