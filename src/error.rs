//! Gateway error taxonomy.
//!
//! DESIGN
//! ======
//! Every failure inside the gateway, whether from the network, the hosted
//! service, local storage or input validation, is a `GatewayError`. Nothing
//! above the gateway sees one directly: results are folded into an
//! [`Envelope`](crate::envelope::Envelope) carrying the message and a stable
//! code from [`ErrorCode`].

/// Message shown to callers for any transport-level failure.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error or server unavailable";

/// Grepable code and retry hint for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Errors produced by gateway, backend and token-store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Credentials rejected, no session, or profile lookup/creation failed.
    #[error("{0}")]
    Auth(String),

    /// The service rejected the bearer token. The stored token is dropped.
    #[error("{0}")]
    Unauthorized(String),

    /// Input rejected locally before any remote call.
    #[error("{0}")]
    Validation(String),

    /// The HTTP request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// The response body did not match the expected record shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The durable token store could not be read or written.
    #[error("token storage failed: {0}")]
    Storage(String),

    /// A configuration value was missing or unparseable.
    #[error("config error: {0}")]
    Config(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl GatewayError {
    /// Convenience constructor for the common `Auth` case.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Text shown to end users. Transport and decode details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) | Self::Decode(_) => NETWORK_ERROR_MESSAGE.to_owned(),
            Self::Service { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// `true` when the stored session token must be discarded.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Service { status: 401, .. })
    }
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "E_AUTH",
            Self::Unauthorized(_) => "E_UNAUTHORIZED",
            Self::Validation(_) => "E_VALIDATION",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Service { .. } => "E_SERVICE",
            Self::Decode(_) => "E_DECODE",
            Self::Storage(_) => "E_STORAGE",
            Self::Config(_) => "E_CONFIG",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Service { status: 429 | 500..=599, .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
