use thiserror::Error;

/// Stage errors (download, image, inference, storage) display only their
/// message; the handler adds the stage prefix when it builds the job result.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("{0}")]
    DownloadError(String),
    #[error("{0}")]
    ImageError(String),
    #[error("{0}")]
    InferenceError(String),
    #[error("{0}")]
    StorageError(String),
    #[error("Runtime error: {0}")]
    RuntimeError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("AWS error: {0}")]
    AwsError(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for WorkerError {
    fn from(e: serde_json::Error) -> Self {
        WorkerError::SerializationError(e.to_string())
    }
}

impl From<image::ImageError> for WorkerError {
    fn from(e: image::ImageError) -> Self {
        WorkerError::ImageError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_display_bare_message() {
        let err = WorkerError::DownloadError("HTTP status 404 Not Found".into());
        assert_eq!(err.to_string(), "HTTP status 404 Not Found");

        let err = WorkerError::ConfigError("B2_KEY_ID must be set".into());
        assert_eq!(err.to_string(), "Configuration error: B2_KEY_ID must be set");
    }
}
