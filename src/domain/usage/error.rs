use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum UsageServiceError {
    #[error("dependency error: {0}")]
    Dependency(String),
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl From<AppError> for UsageServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => UsageServiceError::Invalid(msg),
            _ => UsageServiceError::Dependency(err.to_string()),
        }
    }
}

impl From<UsageServiceError> for AppError {
    fn from(err: UsageServiceError) -> Self {
        match err {
            UsageServiceError::Invalid(msg) => AppError::BadRequest(msg),
            UsageServiceError::Dependency(msg) => AppError::Internal(msg),
        }
    }
}
