use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for step operations. Every variant aborts the whole batch
/// it occurred in; there is no partial application.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown result: {value:?} for step: {uuid}, step could not be updated")]
    UnknownResult { value: String, uuid: Uuid },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        StepError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::StorageUnavailable(err.to_string())
    }
}
