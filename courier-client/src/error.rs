//! Client error types.

use thiserror::Error;

/// Boxed error type used at the middleware and parser seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures reported by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport cancelled the task.
    #[error("transport task was cancelled")]
    Cancelled,

    /// The task exceeded its deadline.
    #[error("transport task timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("connection error: {0}")]
    Connect(String),

    /// The transport violated its delivery contract.
    #[error("transport protocol violation: {0}")]
    Protocol(String),

    /// Underlying HTTP engine error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Check if the transport reported a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout) || matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_)) || matches!(self, Self::Http(e) if e.is_connect())
    }
}

/// Failures produced by a [`ResponseParser`](crate::parser::ResponseParser).
#[derive(Debug, Error)]
pub enum ParseError {
    /// No response body was available to parse.
    #[error("no response body available")]
    DataMissing,

    /// The body was present but did not decode.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] BoxError),
}

/// A response that failed validation, optionally carrying the decoded
/// error-shaped body the server returned alongside the failing status.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// Observed HTTP status, when one was received.
    pub status: Option<u16>,
    /// Decoded error body, when the caller requested one and it decoded.
    pub error_body: Option<serde_json::Value>,
}

impl ValidationFailure {
    /// Project the decoded error body onto a concrete type.
    pub fn error_body_as<E: serde::de::DeserializeOwned>(&self) -> Option<E> {
        self.error_body
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "response failed validation (status {status})"),
            None => write!(f, "response failed validation"),
        }
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed URL or target, caught before dispatch.
    #[error("invalid request descriptor: {0}")]
    InvalidDescriptor(String),

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cooperative cancellation observed by the request itself, as opposed
    /// to a cancellation signaled by the transport.
    #[error("request was cancelled")]
    Cancelled,

    /// Request- or response-stage middleware rejected the exchange.
    /// Never retried automatically by this layer.
    #[error("middleware rejected the exchange: {0}")]
    Middleware(#[source] BoxError),

    /// Status or headers failed a registered validator.
    #[error("{0}")]
    Validation(ValidationFailure),

    /// The body was present but did not decode.
    #[error("parse error: {0}")]
    Parse(#[source] ParseError),

    /// No body where one was required.
    #[error("no response body where one was required")]
    DataMissing,
}

impl From<ParseError> for ClientError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::DataMissing => ClientError::DataMissing,
            other => ClientError::Parse(other),
        }
    }
}

impl ClientError {
    /// Check if the failure is a cancellation, whether observed by the
    /// request or signaled by the transport.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transport(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Get the validation failure details, if any.
    pub fn as_validation(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_maps_data_missing() {
        assert!(matches!(
            ClientError::from(ParseError::DataMissing),
            ClientError::DataMissing
        ));
        assert!(matches!(
            ClientError::from(ParseError::Decode("bad".into())),
            ClientError::Parse(_)
        ));
    }

    #[test]
    fn validation_failure_projects_error_body() {
        let failure = ValidationFailure {
            status: Some(500),
            error_body: Some(serde_json::json!({"code": 500, "description": "oops"})),
        };

        #[derive(serde::Deserialize)]
        struct ErrorModel {
            code: u16,
        }

        let model: ErrorModel = failure.error_body_as().unwrap();
        assert_eq!(model.code, 500);
        assert_eq!(failure.to_string(), "response failed validation (status 500)");
    }

    #[test]
    fn cancellation_is_detected_through_transport() {
        assert!(ClientError::Cancelled.is_cancelled());
        assert!(ClientError::Transport(TransportError::Cancelled).is_cancelled());
        assert!(!ClientError::DataMissing.is_cancelled());
    }
}
