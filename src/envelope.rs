//! Response Envelope returned by every gateway operation.
//!
//! Exactly one of `data` / `error` is present. The enum makes the other
//! combination unrepresentable; on the wire it is `{"data": ...}` or
//! `{"error": "...", "code": "E_..."}`.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, GatewayError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Data { data: T },
    Error { error: String, code: String },
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self::Data { data }
    }

    /// Fold a gateway error into the error form.
    #[must_use]
    pub fn from_error(err: &GatewayError) -> Self {
        let mut error = err.user_message();
        if error.trim().is_empty() {
            error = "An error occurred".to_owned();
        }
        Self::Error { error, code: err.error_code().to_owned() }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Data { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Data { .. } => None,
            Self::Error { code, .. } => Some(code),
        }
    }

    /// Split into a plain `Result` with the user-facing message as the error.
    ///
    /// # Errors
    ///
    /// Returns the envelope's error message when it holds no payload.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Data { data } => Ok(data),
            Self::Error { error, .. } => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        match self {
            Self::Data { data } => Envelope::Data { data: f(data) },
            Self::Error { error, code } => Envelope::Error { error, code },
        }
    }
}

impl<T> From<Result<T, GatewayError>> for Envelope<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::from_error(&err),
        }
    }
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
