//! Errors raised while inspecting media

use thiserror::Error;

/// Failure to decode image data.
///
/// Only [`DecodeError::Io`] reflects a condition that may go away on a second
/// attempt; every other variant describes the bytes themselves.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    #[error("malformed image: {0}")]
    Malformed(String),

    #[error("image exceeds decoder limits: {0}")]
    Limits(String),

    #[error("I/O error while decoding: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DecodeError::Io(_))
    }
}

#[cfg(feature = "image")]
impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;

        match err {
            // Running out of bytes while reading an in-memory buffer is a
            // truncated file, not a transient read failure.
            ImageError::IoError(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
                ) =>
            {
                DecodeError::Malformed(e.to_string())
            }
            ImageError::IoError(e) => DecodeError::Io(e),
            ImageError::Unsupported(e) => DecodeError::Unsupported(e.to_string()),
            ImageError::Limits(e) => DecodeError::Limits(e.to_string()),
            ImageError::Decoding(e) => DecodeError::Malformed(e.to_string()),
            ImageError::Parameter(e) => DecodeError::Malformed(e.to_string()),
            ImageError::Encoding(e) => DecodeError::Malformed(e.to_string()),
        }
    }
}

/// Failure of the external probing / frame extraction tools.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid tool path: {0}")]
    InvalidToolPath(String),

    #[error("invalid input location: {0}")]
    InvalidInput(String),

    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("I/O error talking to {tool}: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable probe output: {0}")]
    InvalidOutput(String),

    #[error("no usable streams: {0}")]
    NoStreams(String),
}

impl ProbeError {
    /// Launch failures, non-zero exits and pipe errors are worth another
    /// attempt; output the tool did produce but that describes no usable
    /// media is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProbeError::Launch { .. } | ProbeError::Failed { .. } | ProbeError::Io { .. }
        )
    }
}
