//! Error types for the BookFusion provider

use bridge_traits::error::BridgeError;
use bridge_traits::remote::RemoteError;
use std::time::Duration;
use thiserror::Error;

/// Step of the three-request upload protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Init,
    Storage,
    Finalize,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Init => "init",
            UploadStage::Storage => "storage upload",
            UploadStage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BookFusion provider errors
#[derive(Error, Debug)]
pub enum BookFusionError {
    /// API key rejected (401/403)
    #[error("{stage} rejected the API key (status {status})")]
    AuthenticationFailed { stage: UploadStage, status: u16 },

    /// 429 from any step
    #[error("{stage} rate limited (status 429)")]
    RateLimited {
        stage: UploadStage,
        retry_after: Option<Duration>,
    },

    /// 408 or 5xx
    #[error("{stage} failed with server error (status {status}): {message}")]
    ServerError {
        stage: UploadStage,
        status: u16,
        message: String,
    },

    /// Any other unexpected status
    #[error("{stage} failed (status {status}): {message}")]
    ApiError {
        stage: UploadStage,
        status: u16,
        message: String,
    },

    /// A 2xx response whose body could not be understood
    #[error("Invalid {stage} response: {message}")]
    InvalidResponse { stage: UploadStage, message: String },

    /// Provider constructed with unusable settings
    #[error("Invalid BookFusion configuration: {0}")]
    Configuration(String),

    /// Transport failure
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for BookFusion operations
pub type Result<T> = std::result::Result<T, BookFusionError>;

impl From<BookFusionError> for RemoteError {
    fn from(error: BookFusionError) -> Self {
        let message = error.to_string();
        match error {
            BookFusionError::AuthenticationFailed { .. } => RemoteError::Auth(message),
            BookFusionError::RateLimited { retry_after, .. } => RemoteError::RateLimited {
                retry_after,
                message,
            },
            BookFusionError::ServerError { .. } => RemoteError::Network(message),
            BookFusionError::ApiError { status, .. } => RemoteError::Rejected {
                status: Some(status),
                message,
            },
            BookFusionError::InvalidResponse { .. } | BookFusionError::Configuration(_) => {
                RemoteError::Rejected {
                    status: None,
                    message,
                }
            }
            BookFusionError::Bridge(bridge) => match bridge {
                BridgeError::Timeout(_)
                | BridgeError::Connection(_)
                | BridgeError::OperationFailed(_) => RemoteError::Network(message),
                // The book file itself could not be read
                BridgeError::Io(_) | BridgeError::NotAvailable(_) | BridgeError::DatabaseError(_) => {
                    RemoteError::Rejected {
                        status: None,
                        message,
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_mapping() {
        let auth: RemoteError = BookFusionError::AuthenticationFailed {
            stage: UploadStage::Init,
            status: 401,
        }
        .into();
        assert!(matches!(auth, RemoteError::Auth(_)));

        let server: RemoteError = BookFusionError::ServerError {
            stage: UploadStage::Storage,
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert!(server.is_transient());

        let timeout: RemoteError = BookFusionError::Bridge(BridgeError::Timeout("30s".into())).into();
        assert!(matches!(timeout, RemoteError::Network(_)));

        let unreadable: RemoteError = BookFusionError::Bridge(BridgeError::Io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        ))
        .into();
        assert!(!unreadable.is_transient());
    }

    #[test]
    fn test_rate_limit_keeps_hint() {
        let limited: RemoteError = BookFusionError::RateLimited {
            stage: UploadStage::Finalize,
            retry_after: Some(Duration::from_secs(12)),
        }
        .into();
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(12)));
    }
}
