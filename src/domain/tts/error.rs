use std::time::Duration;

use crate::error::AppError;

/// Failures of the narration pipeline.
///
/// None of these ever leave a committed artifact behind: the item is only
/// marked processed once every chunk has been synthesized and the assembled
/// audio has been written.
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    /// Empty or whitespace-only text. Raised before any service call.
    #[error("invalid input: {0}")]
    Input(String),
    /// A chunk could not be brought under the service limit.
    #[error("chunk {index} exceeds the speech service limit: {message}")]
    SizeLimit { index: usize, message: String },
    /// The speech service refused the request for a non-retryable reason.
    #[error("speech service error: {0}")]
    Service(String),
    /// Retries exhausted, malformed voice profile or corrupt checkpoint.
    #[error("narration failed: {0}")]
    Fatal(String),
    /// The artifact store, index or ledger failed.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("pipeline timed out after {0:?}")]
    Timeout(Duration),
}

impl NarrationError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        NarrationError::Storage(err.to_string())
    }
}

impl From<AppError> for NarrationError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => NarrationError::Input(msg),
            _ => NarrationError::Storage(err.to_string()),
        }
    }
}

impl From<NarrationError> for AppError {
    fn from(err: NarrationError) -> Self {
        match err {
            NarrationError::Input(msg) => AppError::BadRequest(msg),
            NarrationError::SizeLimit { .. } => AppError::PayloadTooLarge(err.to_string()),
            NarrationError::Service(msg) => AppError::ExternalService(msg),
            NarrationError::Timeout(_) => AppError::Timeout(err.to_string()),
            NarrationError::Fatal(_) | NarrationError::Storage(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
