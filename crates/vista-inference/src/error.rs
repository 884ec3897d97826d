use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference runtime is not loaded")]
    NotLoaded,

    #[error("invalid model input: {0}")]
    InvalidInput(String),

    #[error("inference request failed: {0}")]
    Request(String),

    #[error("inference server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid inference response: {0}")]
    InvalidResponse(String),

    #[error("failed to configure inference client: {0}")]
    Config(String),
}

impl InferenceError {
    /// Whether a later attempt with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::InvalidInput(_) | InferenceError::Config(_) => false,
            // 4xx means the server rejected this input, except for
            // timeouts and throttling.
            InferenceError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InferenceError::InvalidResponse(err.to_string())
        } else {
            InferenceError::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let status = |status| InferenceError::Status {
            status,
            message: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(422).is_retryable());
    }

    #[test]
    fn test_input_errors_are_permanent() {
        assert!(!InferenceError::InvalidInput("empty".into()).is_retryable());
        assert!(InferenceError::NotLoaded.is_retryable());
    }
}
