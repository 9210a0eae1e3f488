use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Message used when a request went out but nothing came back.
pub const NO_RESPONSE_MESSAGE: &str = "No response received from Notion API";

/// Uniform error record surfaced to consumers through `Session::error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub status: u16,
    pub details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status,
            details: None,
        }
    }
}

/// Raw failure reported by a [`Transport`](super::transport::Transport).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The remote answered with a non-success status.
    #[error("HTTP status {status}")]
    Response { status: u16, body: String },
    /// The request was sent but no response arrived.
    #[error("no response for {method} {url}: {reason}")]
    NoResponse {
        method: String,
        url: String,
        reason: String,
    },
    #[error("transport error: {0}")]
    Other(String),
}

/// A central error enum for everything that can go wrong talking to Notion.
#[derive(Debug, Clone, Error)]
pub enum NotionError {
    /// No (or an empty) credential is configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required input was empty or unresolved.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote rejected the credential.
    #[error("Authentication error: {}", .0.message)]
    Authentication(ErrorRecord),

    /// The request was sent but no response arrived.
    #[error("Network error: {}", .0.message)]
    Network(ErrorRecord),

    /// A response arrived carrying an error status.
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ErrorRecord),
}

impl NotionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classifies a transport failure and normalizes it into a record.
    pub fn from_transport(err: &TransportError, default_message: &str) -> Self {
        let record = normalize_error(err, default_message);
        match err {
            TransportError::Response { status: 401, .. } => Self::Authentication(record),
            TransportError::NoResponse { .. } => Self::Network(record),
            _ => Self::Api(record),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// The error as the record shape stored on the session.
    pub fn record(&self) -> ErrorRecord {
        match self {
            Self::Configuration(msg) | Self::Validation(msg) => ErrorRecord::new(msg.clone(), 400),
            Self::Authentication(record) | Self::Network(record) | Self::Api(record) => {
                record.clone()
            }
        }
    }
}

/// Converts a raw transport failure into an [`ErrorRecord`].
///
/// Total over its input: a body that does not parse as JSON is kept verbatim
/// in `details` and the default message is used.
pub fn normalize_error(err: &TransportError, default_message: &str) -> ErrorRecord {
    match err {
        TransportError::Response { status, body } => {
            let details = match serde_json::from_str::<Value>(body) {
                Ok(parsed) => parsed,
                Err(_) if body.is_empty() => Value::Null,
                Err(_) => Value::String(body.clone()),
            };
            let message = details
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or(default_message)
                .to_string();
            ErrorRecord {
                message,
                status: if *status == 0 { 500 } else { *status },
                details: (!details.is_null()).then_some(details),
            }
        }
        TransportError::NoResponse { method, url, reason } => ErrorRecord {
            message: NO_RESPONSE_MESSAGE.to_string(),
            status: 500,
            details: Some(json!({
                "request": { "method": method, "url": url, "reason": reason }
            })),
        },
        TransportError::Other(_) => ErrorRecord::new(default_message, 500),
    }
}
