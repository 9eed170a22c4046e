use thiserror::Error;

use crate::entity::EntityId;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("{space} {key} exists")]
    DuplicateKey { space: String, key: String },

    #[error("No index on '{space}' for params {params}")]
    NoIndexForParams { space: String, params: String },

    #[error("No {space} found using {params}")]
    NotFound { space: String, params: String },

    #[error("Use truncate to flush space '{space}'")]
    UseTruncate { space: String },

    #[error("Entity class override: more than one plugin claims '{space}'")]
    EntityClassConflict { space: String },

    #[error("Space '{space}' has no primary index")]
    NoPrimaryIndex { space: String },

    #[error("Space '{0}' not found")]
    SpaceNotFound(String),

    #[error("Space '{0}' already exists")]
    SpaceExists(String),

    #[error("Field '{field}' not found in space '{space}'")]
    FieldNotFound { space: String, field: String },

    #[error("Entity {0} is not held by this repository")]
    EntityNotFound(EntityId),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl<T> From<std::sync::PoisonError<T>> for MapperError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
