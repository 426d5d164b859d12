use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate name: {0}")]
    DuplicateName(String),
    #[error("Instance initialization error: {0}")]
    InstanceInit(String),
    #[error("Active graph cannot be deleted: {0}")]
    ActiveGraphDeletion(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
