//! Error taxonomy for provider calls and dispatches.
//!
//! `ProviderError` is what an adapter returns for a single attempt.
//! `DispatchError` is what the caller of [`Dispatcher`](super::Dispatcher)
//! sees once validation, retries and cancellation have been resolved.

use thiserror::Error;

/// Failure of a single provider attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network fault, timeout, 408/429/5xx, or an unreadable payload
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider explicitly refused the request (bad request, invalid key...)
    #[error("rejected (status {}): {message}", status_label(.status))]
    Rejected { status: Option<u16>, message: String },

    /// The adapter could not build a payload from the request
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProviderError {
    /// Transient errors are worth another attempt; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Transport(format!("request timeout: {}", e))
        } else if e.is_connect() {
            ProviderError::Transport(format!("connection failed: {}", e))
        } else if e.is_builder() {
            ProviderError::InvalidInput(format!("could not build request: {}", e))
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Terminal outcome of a dispatch that did not produce a response
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Prompt rejected before any network activity
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No adapter registered under this id
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider refused the request; never retried
    #[error("provider '{provider}' rejected the request (status {}): {message}", status_label(.status))]
    ProviderRejected {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Transient failures persisted through every allowed attempt
    #[error("provider '{provider}' failed after {attempts} attempt(s): {cause}")]
    ProviderRequest {
        provider: String,
        attempts: u32,
        #[source]
        cause: ProviderError,
    },

    /// The caller cancelled the dispatch
    #[error("dispatch cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl DispatchError {
    /// Whether the caller could reasonably try the same dispatch again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ProviderRequest { .. } | DispatchError::Cancelled { .. }
        )
    }
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(!ProviderError::Rejected {
            status: Some(401),
            message: "bad key".into()
        }
        .is_transient());
        assert!(!ProviderError::InvalidInput("no model".into()).is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = DispatchError::ProviderRequest {
            provider: "openai".into(),
            attempts: 3,
            cause: ProviderError::Transport("HTTP 503".into()),
        };
        assert_eq!(
            err.to_string(),
            "provider 'openai' failed after 3 attempt(s): transport error: HTTP 503"
        );

        let err = DispatchError::ProviderRejected {
            provider: "anthropic".into(),
            status: Some(400),
            message: "max_tokens required".into(),
        };
        assert!(err.to_string().contains("status 400"));
        assert!(!err.is_retryable());
    }
}
