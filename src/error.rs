//! Error types for social-connect

use thiserror::Error;

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an OAuth2 flow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State cipher error: {0}")]
    StateCipher(String),

    #[error("State not found: {0}")]
    StateNotFound(String),

    #[error("Callback rejected: {0}")]
    Callback(#[from] CallbackError),

    #[error("Transport error during {step}: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Exchange failed during {step}: {failure}")]
    ExchangeFailed {
        step: &'static str,
        failure: ExchangeFailure,
    },

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Reasons an authorization callback is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("missing authorization code")]
    MissingCode,

    #[error("no code verifier found for state")]
    MissingVerifier,

    #[error("state mismatch")]
    StateMismatch,

    #[error("unknown or expired state")]
    UnknownState,

    /// The provider redirected back with an `error` instead of a code
    #[error("provider denied authorization: {0}")]
    ProviderDenied(String),
}

/// Detail for a token/refresh endpoint that answered but could not be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeFailure {
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unusable response body: {0}")]
    Body(String),
}

impl Error {
    /// The flow can be retried as-is (network or endpoint trouble).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::ExchangeFailed { failure, .. } => match failure {
                ExchangeFailure::Status { status, .. } => *status >= 500 || *status == 429,
                ExchangeFailure::Body(_) => false,
            },
            _ => false,
        }
    }

    /// The user has to go through the authorize redirect again.
    pub fn requires_new_flow(&self) -> bool {
        matches!(
            self,
            Error::Callback(_) | Error::StateCipher(_) | Error::StateNotFound(_)
        )
    }

    pub(crate) fn exchange_status(step: &'static str, status: u16, body: String) -> Self {
        Error::ExchangeFailed {
            step,
            failure: ExchangeFailure::Status { status, body },
        }
    }

    pub(crate) fn exchange_body(step: &'static str, reason: impl Into<String>) -> Self {
        Error::ExchangeFailed {
            step,
            failure: ExchangeFailure::Body(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_errors_require_new_flow() {
        let err: Error = CallbackError::StateMismatch.into();
        assert!(err.requires_new_flow());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = Error::exchange_status("token exchange", 503, "busy".to_string());
        assert!(err.is_retryable());
        assert!(!err.requires_new_flow());

        let err = Error::exchange_status("token exchange", 400, "bad code".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_body_failure_message_names_step() {
        let err = Error::exchange_body("token refresh", "missing access_token");
        assert_eq!(
            err.to_string(),
            "Exchange failed during token refresh: unusable response body: missing access_token"
        );
    }
}
