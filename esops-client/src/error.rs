//! Error types for cluster operations.

use thiserror::Error;

/// Result type alias for cluster operations.
pub type Result<T> = std::result::Result<T, EsClientError>;

/// Errors raised by the client.
#[derive(Debug, Error)]
pub enum EsClientError {
    /// No response was obtained from a host (connection refused, DNS, timeout).
    ///
    /// The dispatcher recovers from this by failing over to the next host, so
    /// callers normally only see it folded into [`EsClientError::HostsExhausted`].
    #[error("Transport failure on {host}: {message}")]
    Transport {
        /// Host that failed.
        host: String,
        /// Underlying error message.
        message: String,
    },

    /// Every candidate host was tried and none produced a response.
    #[error("All hosts exhausted after {attempts} attempts")]
    HostsExhausted {
        /// Number of hosts attempted.
        attempts: usize,
        /// Message of the last transport failure, if any host was tried.
        last_error: Option<String>,
    },

    /// A response was received with an error status.
    #[error("Application error: {status} - {reason}")]
    Application {
        /// HTTP status code.
        status: u16,
        /// Error reason extracted from the body.
        reason: String,
    },

    /// The response body did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while writing into a payload buffer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EsClientError {
    /// Check if this is a transport-level failure (no response received).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if every host was exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::HostsExhausted { .. })
    }

    /// Check if this is a "not found" application error.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Get the HTTP status code if this is an application error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pull a human readable reason out of an error response body.
///
/// Handles `{"error": {"reason": ..}}`, `{"error": ".."}` and non-JSON bodies.
pub(crate) fn error_reason(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => {
            let error = &value["error"];
            error
                .get("reason")
                .and_then(|r| r.as_str())
                .or_else(|| error.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string())
        }
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let transport = EsClientError::Transport {
            host: "http://a:9200".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(transport.is_transport());
        assert!(!transport.is_exhausted());
        assert_eq!(transport.status_code(), None);

        let missing = EsClientError::Application {
            status: 404,
            reason: "index_not_found_exception".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.status_code(), Some(404));

        let exhausted = EsClientError::HostsExhausted {
            attempts: 3,
            last_error: None,
        };
        assert!(exhausted.is_exhausted());
        assert_eq!(exhausted.to_string(), "All hosts exhausted after 3 attempts");
    }

    #[test]
    fn test_error_reason_shapes() {
        let nested = br#"{"error":{"type":"x","reason":"no such index [docs]"},"status":404}"#;
        assert_eq!(error_reason(nested), "no such index [docs]");

        let flat = br#"{"error":"Incorrect HTTP method"}"#;
        assert_eq!(error_reason(flat), "Incorrect HTTP method");

        assert_eq!(error_reason(b"  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_reason(b""), "");
    }
}
