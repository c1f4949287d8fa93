//! Error types for opsmail.

use thiserror::Error;

/// Result type alias using opsmail's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for opsmail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Linking rule not found
    #[error("Rule not found: {0}")]
    RuleNotFound(uuid::Uuid),

    /// Operation not found
    #[error("Operation not found: {0}")]
    OperationNotFound(uuid::Uuid),

    /// Structured extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (includes referential-integrity rejections)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Scheduler/queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_rule_not_found() {
        let id = Uuid::nil();
        let err = Error::RuleNotFound(id);
        assert_eq!(err.to_string(), format!("Rule not found: {}", id));
    }

    #[test]
    fn test_error_display_operation_not_found() {
        let id = Uuid::new_v4();
        let err = Error::OperationNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("service unreachable".to_string());
        assert_eq!(err.to_string(), "Extraction error: service unreachable");
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("write conflict".to_string());
        assert_eq!(err.to_string(), "Storage error: write conflict");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("client belongs to another organization".to_string());
        assert!(err.to_string().starts_with("Invalid input:"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing extractor URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing extractor URL");
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("queue full".to_string());
        assert_eq!(err.to_string(), "Job error: queue full");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
