use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Transport-level failure talking to the hosted backend. Never means "absent".
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A row came back from the store in a shape we cannot use.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External service error: {0}")]
    External(String),
}

impl AppError {
    /// Transient failures leave state as last-known-good and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Unavailable(_) | AppError::External(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::InvalidRecord(err.to_string())
        } else {
            AppError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRecord(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Unavailable("timeout".into()).is_transient());
        assert!(AppError::External("502".into()).is_transient());
        assert!(!AppError::NotFound("team".into()).is_transient());
        assert!(!AppError::Conflict("name".into()).is_transient());
        assert!(!AppError::Forbidden.is_transient());
    }
}
