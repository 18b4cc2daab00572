//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Response            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  HttpStatus             │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  MalformedResponse      │ │
//! │  │  ConfigLoad     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ Authentication  │  │   Validation    │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  AuthRejected   │  │  Validation     │  │  ShuttingDown           │ │
//! │  │  TokenExpired   │  │  (from core)    │  │  Internal               │ │
//! │  │  RefreshFailed  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use homebox_core::ValidationError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - Parser and HTTP client internals never leak except as a `source`
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Network-level failure: connection refused, DNS, client timeout.
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A reconciliation cycle exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // =========================================================================
    // Response Errors
    // =========================================================================
    /// Server answered with a non-success status other than 401.
    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus { status: u16, body: String, url: String },

    /// Success status, but the body is not usable JSON.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// A 401 that survived one refresh-and-retry.
    #[error("Authentication rejected by {url} after token refresh")]
    AuthRejected { url: String },

    /// Static token was rejected and cannot be renewed automatically.
    #[error("The configured API token has expired and cannot be refreshed automatically. Obtain a new token from Homebox and update the configuration.")]
    TokenExpired,

    /// Token refresh failed; the scheduler will try again.
    #[error("Token refresh failed, will retry: {0}")]
    RefreshFailed(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Caller supplied an unknown id or invalid value.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The coordinator was shut down; no further cycles or writes run.
    #[error("Sync coordinator is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("background task failed: {}", err))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the next scheduled attempt may succeed without any
    /// user action.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - 5xx and 429 responses
    /// - Transient refresh failures
    ///
    /// ## Non-Retryable Errors
    /// - Configuration and validation errors
    /// - An expired static token
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { .. } | SyncError::Timeout(_) | SyncError::RefreshFailed(_) => {
                true
            }
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error is an authentication failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::AuthRejected { .. } | SyncError::TokenExpired | SyncError::RefreshFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }

    /// A message a host can show the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::AuthRejected { .. } => {
                "Homebox rejected the credentials even after a token refresh. Check the configured account or token.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(SyncError::RefreshFailed("503".into()).is_retryable());
        assert!(SyncError::HttpStatus {
            status: 502,
            body: String::new(),
            url: "http://h/api/v1/items".into()
        }
        .is_retryable());

        assert!(!SyncError::HttpStatus {
            status: 404,
            body: String::new(),
            url: "http://h/api/v1/items".into()
        }
        .is_retryable());
        assert!(!SyncError::TokenExpired.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_auth_messages_are_distinct() {
        let expired = SyncError::TokenExpired.to_string();
        let transient = SyncError::RefreshFailed("connection reset".into()).to_string();

        assert!(expired.contains("new token"));
        assert!(transient.contains("will retry"));
        assert!(SyncError::TokenExpired.is_auth_error());
        assert!(!SyncError::ShuttingDown.is_auth_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::HttpStatus {
            status: 500,
            body: "boom".into(),
            url: "http://h/api/v1/items".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from http://h/api/v1/items: boom");
    }

    #[test]
    fn test_validation_converts() {
        let err: SyncError = ValidationError::not_found("item", "item-1").into();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
