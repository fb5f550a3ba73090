use thiserror::Error;

/// Top-level error kinds surfaced across crate boundaries.
///
/// Each downstream crate (`pageproof-pdf`, `pageproof-store`, `pageproof-qa`)
/// defines its own narrower error enum and converts into this one at the
/// crate boundary.
#[derive(Debug, Error)]
pub enum PageProofError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    TooLarge(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("provider failure: {0}")]
    ProviderFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PageProofError {
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
