//! Error types for bulk operations.
//!
//! Transport faults, lookup faults and business faults are kept apart so that
//! compensation logic and the bulk runner can match on the kind of failure
//! instead of inspecting messages.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::services::Action;
use crate::transport::ApiResponse;

/// The main error type for bulk operations.
#[derive(Debug, Error)]
pub enum BulkOpError {
    /// A transport fault surfaced outside of a task step.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A business key could not be resolved.
    #[error("{0}")]
    Lookup(#[from] LookupError),

    /// A step of the operation failed permanently.
    #[error("{0}")]
    OperationFailed(#[from] OperationFailed),

    /// The input row could not be turned into a model.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// No service is registered for the requested operation.
    #[error("No service registered for {tool}.{data_type}.{action}")]
    UnknownService {
        /// The tool name.
        tool: String,
        /// The data type.
        data_type: String,
        /// The requested action.
        action: Action,
    },

    /// The operation was abandoned through its cancellation token.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configuration problem.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl BulkOpError {
    /// Creates an operation failure without an underlying transport cause.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(OperationFailed::new(message))
    }

    /// Whether retrying the whole row later could succeed.
    ///
    /// Only exhausted rate limiting qualifies; every other fault is permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_rate_limited(),
            Self::Lookup(LookupError::Transport(err)) => err.is_rate_limited(),
            Self::OperationFailed(failed) => failed
                .cause
                .as_ref()
                .is_some_and(TransportError::is_rate_limited),
            _ => false,
        }
    }

    /// Short stable label for logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Lookup(LookupError::NotFound { .. }) => "not_found",
            Self::Lookup(LookupError::Transport(_)) => "lookup_transport",
            Self::OperationFailed(_) => "operation_failed",
            Self::InvalidModel(_) => "invalid_model",
            Self::UnknownService { .. } => "unknown_service",
            Self::Cancelled(_) => "cancelled",
            Self::Config(_) => "config",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));

        match self {
            Self::Transport(err) | Self::Lookup(LookupError::Transport(err)) => {
                if let Some(status) = err.status() {
                    map.insert("status".to_string(), serde_json::json!(status));
                }
            }
            Self::OperationFailed(failed) => {
                if let Some(ref step) = failed.step {
                    map.insert("step".to_string(), serde_json::json!(step));
                }
                if let Some(status) = failed.cause.as_ref().and_then(TransportError::status) {
                    map.insert("status".to_string(), serde_json::json!(status));
                }
            }
            _ => {}
        }

        map
    }
}

/// Non-2xx response from the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Server fault ({status}): {message}")]
pub struct ServerFault {
    /// HTTP status code.
    pub status: u16,
    /// Best-effort human readable message.
    pub message: String,
    /// Raw response body.
    pub body: String,
}

impl ServerFault {
    /// Creates a new server fault.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: String::new(),
        }
    }

    /// Builds a fault from a response, extracting the platform's message.
    #[must_use]
    pub fn from_response(response: &ApiResponse) -> Self {
        Self {
            status: response.status,
            message: fault_message(&response.body),
            body: response.body.clone(),
        }
    }
}

/// Extracts the error message from a platform error body.
///
/// The top-level `message` wins; the first entry of a validation `errors`
/// array is appended (message, then field). Non-JSON bodies come back as-is.
pub fn fault_message(body: &str) -> String {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    let top = map.get("message").and_then(Value::as_str);
    let first_error = map
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first());

    match (top, first_error) {
        (Some(message), Some(error)) => {
            let detail = error.get("message").and_then(Value::as_str).unwrap_or_default();
            let field = error.get("field").and_then(Value::as_str).unwrap_or_default();
            [message, detail, field]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        }
        (Some(message), None) => message.to_string(),
        (None, Some(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| body.to_string(), String::from),
        (None, None) => body.to_string(),
    }
}

/// Rate limiting that outlasted the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limited (retry after {}s): {}", retry_after.as_secs(), fault.message)]
pub struct RateLimitError {
    /// The underlying fault.
    pub fault: ServerFault,
    /// The delay the server asked for on the last attempt.
    pub retry_after: Duration,
}

impl RateLimitError {
    /// Creates a new rate limit error.
    #[must_use]
    pub fn new(fault: ServerFault, retry_after: Duration) -> Self {
        Self { fault, retry_after }
    }
}

/// Errors raised by the retrying transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-2xx response that is not retried.
    #[error("{0}")]
    Server(ServerFault),

    /// Rate limiting persisted through every attempt.
    #[error("{0}")]
    RateLimited(RateLimitError),

    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Returns the server fault, for both plain and rate-limit faults.
    #[must_use]
    pub fn fault(&self) -> Option<&ServerFault> {
        match self {
            Self::Server(fault) => Some(fault),
            Self::RateLimited(err) => Some(&err.fault),
            Self::Http(_) | Self::Decode(_) => None,
        }
    }

    /// Returns the HTTP status, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.fault().map(|fault| fault.status)
    }

    /// Whether this is an exhausted rate limit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors raised by the lookup resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No entity of this kind has the business key.
    #[error("{kind} {key} does not exist.")]
    NotFound {
        /// Entity kind label, e.g. "Queue".
        kind: String,
        /// The business key that was searched for.
        key: String,
    },

    /// Reference data could not be listed.
    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl LookupError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Whether this is a missing entity rather than a transport fault.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A permanent failure of one step of a row operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailed {
    /// The step that failed, if known.
    pub step: Option<String>,
    /// What went wrong.
    pub message: String,
    /// The transport fault behind the failure, if any.
    pub cause: Option<TransportError>,
}

impl OperationFailed {
    /// Creates a business failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            step: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps a transport fault raised while performing a step.
    #[must_use]
    pub fn from_transport(step: impl Into<String>, cause: TransportError) -> Self {
        let message = cause
            .fault()
            .map_or_else(|| cause.to_string(), |fault| fault.message.clone());
        Self {
            step: Some(step.into()),
            message,
            cause: Some(cause),
        }
    }

    /// Sets the failing step.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

impl fmt::Display for OperationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(ref step) => write!(f, "{step}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for OperationFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Missing configuration value: {0}")]
    Missing(String),

    /// A value could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    Invalid {
        /// The configuration key.
        key: String,
        /// The offending value.
        value: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The logging subscriber could not be installed.
    #[error("Logging setup error: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
        }
    }
}
