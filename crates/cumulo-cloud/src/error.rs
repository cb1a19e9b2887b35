//! Cloud client error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

use crate::region::Region;

/// Error that can occur while talking to the cloud provider.
#[derive(Debug, Error)]
pub enum CloudError {
    // Connection errors (usually transient)
    /// Failed to establish a connection to the provider endpoint.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider call timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Provider endpoint is temporarily unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// Network error during communication.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider rejected the call because of rate limiting.
    #[error("throttled: {message}")]
    Throttled { message: String },

    // Authentication errors (permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Insufficient permissions for the operation.
    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    // Configuration errors (permanent)
    /// Client configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The requested region is not enabled for this account.
    #[error("region not enabled: {region}")]
    RegionNotEnabled { region: Region },

    // Resource errors
    /// Resource already exists in the provider account (create conflict).
    #[error("resource already exists: {identifier}")]
    ResourceExists { identifier: String },

    /// Resource not found in the provider account (update/delete target missing).
    #[error("resource not found: {identifier}")]
    ResourceNotFound { identifier: String },

    /// Constraint violation reported by the provider.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// A provider response could not be mapped into a record.
    #[error("invalid provider data: {message}")]
    InvalidData { message: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CloudError {
    /// Check if this error is transient and the call should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may
    /// resolve themselves, such as network issues or rate limiting.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::ConnectionFailed { .. }
                | CloudError::ConnectionTimeout { .. }
                | CloudError::Unavailable { .. }
                | CloudError::Network { .. }
                | CloudError::Throttled { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            CloudError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            CloudError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            CloudError::Unavailable { .. } => "UNAVAILABLE",
            CloudError::Network { .. } => "NETWORK_ERROR",
            CloudError::Throttled { .. } => "THROTTLED",
            CloudError::AuthenticationFailed => "AUTH_FAILED",
            CloudError::AuthorizationFailed { .. } => "AUTHORIZATION_FAILED",
            CloudError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            CloudError::RegionNotEnabled { .. } => "REGION_NOT_ENABLED",
            CloudError::ResourceExists { .. } => "RESOURCE_EXISTS",
            CloudError::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            CloudError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            CloudError::InvalidData { .. } => "INVALID_DATA",
            CloudError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        CloudError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CloudError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        CloudError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CloudError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        CloudError::Unavailable {
            message: message.into(),
        }
    }

    /// Create a throttled error.
    pub fn throttled(message: impl Into<String>) -> Self {
        CloudError::Throttled {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        CloudError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        CloudError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        CloudError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CloudError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for cloud client operations.
pub type CloudResult<T> = Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            CloudError::connection_failed("test"),
            CloudError::ConnectionTimeout { timeout_secs: 30 },
            CloudError::unavailable("test"),
            CloudError::network("test"),
            CloudError::throttled("test"),
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(
                !err.is_permanent(),
                "Expected {} to not be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            CloudError::AuthenticationFailed,
            CloudError::AuthorizationFailed {
                operation: "create".to_string(),
            },
            CloudError::invalid_configuration("test"),
            CloudError::ResourceExists {
                identifier: "test".to_string(),
            },
            CloudError::ResourceNotFound {
                identifier: "test".to_string(),
            },
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_display() {
        let err = CloudError::ConnectionTimeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "connection timeout after 30 seconds");

        let err = CloudError::AuthorizationFailed {
            operation: "delete".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "authorization failed: insufficient permissions for delete"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::other("underlying error");
        let err = CloudError::connection_failed_with_source("failed", source_err);

        assert!(err.is_transient());
        if let CloudError::ConnectionFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected ConnectionFailed variant");
        }
    }
}
