use std::fmt;

/// Typed error for the chat transport.
///
/// Distinguishes network, HTTP status, stream read and parse failures
/// so callers can decide what to surface and what to just log.
#[derive(Debug)]
pub enum ApiError {
    /// Network-level failure (DNS, connection, timeout)
    Network(String),
    /// Server returned a non-success HTTP status
    Api { status: u16, body: String },
    /// Error reading from the response body
    StreamRead(String),
    /// Failed to parse a response payload
    Parse(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Api { status, body } => write!(f, "API error {}: {}", status, body),
            ApiError::StreamRead(msg) => write!(f, "Stream read error: {}", msg),
            ApiError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}
