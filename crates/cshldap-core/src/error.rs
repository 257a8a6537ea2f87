//! Error types for directory operations.
//!
//! Every fallible call in the workspace returns [`Result`]. Directory protocol failures are
//! carried unmodified inside [`Error::ExternalServiceError`]; lookups that find nothing are
//! reported as `None` / empty collections by the callers, never as an error.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid directory endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Directory timestamp could not be parsed
    #[error("Invalid directory timestamp: {0}")]
    InvalidTimestamp(String),

    /// The connection never completed its bind
    #[error("Directory connection is not bound: {0}")]
    NotBound(String),

    /// External service error
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a protocol error attributed to the LDAP directory.
    #[must_use]
    pub fn ldap(message: impl Into<String>) -> Self {
        Self::ExternalServiceError {
            service: "ldap".to_string(),
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Self::NotBound(_) => "NOT_BOUND",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::NotBound(_) | Self::ExternalServiceError { .. }
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Self::InvalidTimestamp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::InvalidEndpoint("test".to_string()).error_code(),
            "INVALID_ENDPOINT"
        );
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::InvalidRequest("test".to_string()).error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            Error::InvalidTimestamp("test".to_string()).error_code(),
            "INVALID_TIMESTAMP"
        );
        assert_eq!(
            Error::NotBound("test".to_string()).error_code(),
            "NOT_BOUND"
        );
        assert_eq!(Error::ldap("msg").error_code(), "EXTERNAL_SERVICE_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = Error::ldap("insufficientAccessRights");
        assert_eq!(
            err.to_string(),
            "External service error: ldap: insufficientAccessRights"
        );

        let err = Error::NotBound("no kerberos ticket".to_string());
        assert_eq!(
            err.to_string(),
            "Directory connection is not bound: no kerberos ticket"
        );
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConfigError("test".to_string()).should_log());
        assert!(Error::NotBound("test".to_string()).should_log());
        assert!(Error::ldap("msg").should_log());

        assert!(!Error::InvalidRequest("test".to_string()).should_log());
        assert!(!Error::InvalidTimestamp("test".to_string()).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn test_from_chrono_parse_error() {
        let err = chrono::NaiveDateTime::parse_from_str("1990", "%Y%m%d%H%M").unwrap_err();
        let converted: Error = err.into();
        assert_eq!(converted.error_code(), "INVALID_TIMESTAMP");
    }

    #[test]
    fn test_error_clone() {
        let err = Error::ldap("noSuchObject");
        assert_eq!(err.clone(), err);
    }
}
