use crate::webauthn::encoding::DecodeError;
use thiserror::Error;

/// Everything that can end a ceremony before it completes.
#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("WebAuthn is not supported on this platform")]
    UnsupportedPlatform,
    #[error("enter the {0} first")]
    MissingInput(&'static str),
    #[error("no credential created")]
    NoCredentialCreated,
    #[error("no assertion returned")]
    NoAssertionReturned,
    #[error("{0}")]
    Request(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid ceremony options: {0}")]
    InvalidOptions(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("could not reach the relying party: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Json(#[from] serde_json::Error),
}

impl CeremonyError {
    /// Cancelled or declined ceremonies, which the user can simply retry.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            CeremonyError::NoCredentialCreated | CeremonyError::NoAssertionReturned
        )
    }
}
