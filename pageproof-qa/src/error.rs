use pageproof_model::PageProofError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("document is not ready")]
    DocumentNotReady,

    #[error("document not found")]
    DocumentNotFound,

    #[error("missing or invalid provider configuration: {0}")]
    Configuration(String),

    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<pageproof_store::StoreError> for QaError {
    fn from(err: pageproof_store::StoreError) -> Self {
        QaError::Store(err.to_string())
    }
}

impl From<QaError> for PageProofError {
    fn from(err: QaError) -> Self {
        match err {
            QaError::EmptyQuestion => PageProofError::InvalidInput(err.to_string()),
            QaError::DocumentNotReady => PageProofError::Conflict(err.to_string()),
            QaError::DocumentNotFound => PageProofError::NotFound(err.to_string()),
            QaError::Configuration(_) => PageProofError::ConfigurationError(err.to_string()),
            QaError::Provider(_) => PageProofError::ProviderFailure(err.to_string()),
            QaError::Store(_) | QaError::Internal(_) => PageProofError::InternalError(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
