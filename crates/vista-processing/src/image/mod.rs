//! Image processing module
//!
//! - Header-only metadata extraction (processor)
//! - Model input preparation: center crop, resize, normalization (preprocess)

pub mod preprocess;
pub mod processor;

pub use preprocess::preprocess;
pub use processor::read_header;
