//! Error types and handling
//!
//! Errors for application-level concerns that sit outside a recording
//! session (the persisted settings store).

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl AppError {
    /// Stable code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Settings(_) => "SETTINGS_ERROR",
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::Settings("bad key".to_string());
        assert_eq!(err.code(), "SETTINGS_ERROR");
        assert_eq!(err.to_string(), "Settings error: bad key");

        let io = AppError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.code(), "IO_ERROR");
    }
}
