use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    StateError,
    ConsistencyError,
    StorageError,
    SinkFailure,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateError => "state_error",
            ErrorKind::ConsistencyError => "consistency_error",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::SinkFailure => "sink_failure",
        }
    }
}

#[derive(Error, Debug)]
pub enum StockError {
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid state transition: {0}")]
    State(String),

    #[error("insufficient stock: {0}")]
    Consistency(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl StockError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        StockError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StockError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::Validation { .. } => ErrorKind::ValidationError,
            StockError::NotFound { .. } => ErrorKind::NotFound,
            StockError::State(_) => ErrorKind::StateError,
            StockError::Consistency(_) => ErrorKind::ConsistencyError,
            StockError::Storage(_) => ErrorKind::StorageError,
        }
    }
}

pub type StockResult<T> = Result<T, StockError>;
