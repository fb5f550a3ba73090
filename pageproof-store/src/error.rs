use pageproof_model::PageProofError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("document not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for PageProofError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PageProofError::NotFound(format!("document {id}")),
            other => PageProofError::InternalError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
