// Normalised error for every failed backend call.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Message used when a non-2xx body carries no `message` field.
pub const GENERIC_MESSAGE: &str = "Something went wrong";
pub const NO_REFRESH_TOKEN_MESSAGE: &str = "No refresh token available";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
const INVALID_FORM_MESSAGE: &str = "Invalid form data";

/// Status used for failures that never produced a usable response.
pub const TRANSPORT_STATUS: u16 = 500;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400: the body carries field-level messages.
    Validation,
    /// 401: the session is missing, expired or was rejected.
    Unauthorized,
    /// Any other non-2xx status.
    Other,
    /// Network failure or an unparseable body, reported as status 500.
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Other => "other",
            ErrorKind::Transport => "transport",
        };
        f.write_str(s)
    }
}

/// A failed backend call.
///
/// `status` is the exact HTTP status for real responses. Transport and
/// parse failures become status 500 with a per-operation fallback message;
/// the underlying detail is kept in `cause` for logs and never changes
/// `status` or `message`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    pub data: Value,
    cause: Option<String>,
    synthetic: bool,
    session_call: bool,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: u16, data: Value) -> Self {
        Self {
            message: message.into(),
            status,
            data,
            cause: None,
            synthetic: false,
            session_call: false,
        }
    }

    /// Error for a non-2xx response whose body parsed as JSON.
    pub fn from_response(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_MESSAGE)
            .to_string();
        Self::new(message, status, body)
    }

    /// Synthetic 500 for a call that produced no usable response.
    pub fn fallback(message: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(message, TRANSPORT_STATUS, Value::Null)
        }
    }

    pub fn no_refresh_token() -> Self {
        Self::new(NO_REFRESH_TOKEN_MESSAGE, 401, Value::Null)
    }

    pub fn session_expired() -> Self {
        Self::new(SESSION_EXPIRED_MESSAGE, 401, Value::Null).in_session()
    }

    /// Mark the error as coming from a request that carried the session.
    /// Only those 401s mean the session expired; a 401 from login is a
    /// rejected password.
    pub fn in_session(mut self) -> Self {
        self.session_call = true;
        self
    }

    /// Attach the underlying failure.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        if self.synthetic {
            return ErrorKind::Transport;
        }
        match self.status {
            400 => ErrorKind::Validation,
            401 => ErrorKind::Unauthorized,
            _ => ErrorKind::Other,
        }
    }

    /// True for a real 401 response (not a synthetic failure).
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Field-level messages from a 400 body, e.g. `{"email": ["taken"]}`.
    /// The `message` key itself is excluded.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let Some(map) = self.data.as_object() else {
            return Vec::new();
        };
        map.iter()
            .filter(|(field, _)| field.as_str() != "message")
            .filter_map(|(field, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" "),
                    _ => return None,
                };
                (!text.is_empty()).then(|| (field.clone(), text))
            })
            .collect()
    }

    /// Text to show the user.
    ///
    /// A 400 lists the backend's `message` followed by any field errors,
    /// e.g. `"name: This field is required."`. Errors under
    /// `non_field_errors` or `detail` are shown without the key.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unauthorized if self.session_call => SESSION_EXPIRED_MESSAGE.to_string(),
            ErrorKind::Validation => {
                let mut parts: Vec<String> = self
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .into_iter()
                    .collect();
                parts.extend(self.field_errors().into_iter().map(|(field, text)| {
                    match field.as_str() {
                        "non_field_errors" | "detail" => text,
                        _ => format!("{field}: {text}"),
                    }
                }));
                if parts.is_empty() {
                    INVALID_FORM_MESSAGE.to_string()
                } else {
                    parts.join("; ")
                }
            }
            ErrorKind::Unauthorized | ErrorKind::Other | ErrorKind::Transport => {
                self.message.clone()
            }
        }
    }
}
