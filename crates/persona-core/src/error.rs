//! Error types module
//!
//! `ApiError` is the structured form of a non-success backend response. It is
//! built from whatever the server put in the body without assuming a shape,
//! and carries the HTTP status so callers can classify it (5xx, auth, ...).

use serde_json::Value;

/// Message shown for any 5xx response, whatever the body said.
pub const SERVER_ERROR_MESSAGE: &str = "Server error, please try again";

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for auth problems and throttling
    Warn,
    /// Error level - for server failures
    Error,
}

/// Metadata describing how an error should be classified and reported.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "NOT_FOUND")
    fn error_code(&self) -> &str;

    /// Whether retrying the same request later may succeed
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Structured error produced from a non-success HTTP response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// Original HTTP status code
    pub status_code: u16,
    /// Resolved human-readable message
    pub message: String,
    /// Error code from `error.code` or `code`
    pub code: Option<String>,
    /// The message field exactly as the server sent it (string or list)
    pub raw_message: Option<Value>,
}

impl ApiError {
    /// Error for a body that could not be parsed as JSON.
    pub fn unparsed(status_code: u16) -> Self {
        Self {
            status_code,
            message: format!("Request failed with status {}", status_code),
            code: None,
            raw_message: None,
        }
    }

    /// Build a structured error from a raw response body.
    ///
    /// Never fails: an unreadable body degrades to [`ApiError::unparsed`], and a
    /// JSON body without a message falls back to `fallback_message`.
    pub fn from_body(status_code: u16, body: &[u8], fallback_message: &str) -> Self {
        let body: Value = match serde_json::from_slice(body) {
            Ok(body) => body,
            Err(_) => return Self::unparsed(status_code),
        };

        let error = body.get("error");

        // A top-level message only counts when there is no `error` object.
        let raw_message = match error {
            Some(Value::Object(error)) => error.get("message"),
            _ => body.get("message"),
        }
        .filter(|v| !v.is_null())
        .cloned();

        let message = raw_message
            .as_ref()
            .and_then(message_text)
            .unwrap_or_else(|| fallback_message.to_string());

        let code = error
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .or_else(|| body.get("code").and_then(Value::as_str))
            .map(str::to_string);

        Self {
            status_code,
            message,
            code,
            raw_message,
        }
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    /// Copy suitable for showing to an operator.
    ///
    /// 5xx always maps to a generic retry message. A message the server sent
    /// wins over the code table; the code table wins over our own fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        if self.is_server_error() {
            return SERVER_ERROR_MESSAGE.to_string();
        }

        if self.raw_message.as_ref().and_then(message_text).is_none() {
            if let Some(friendly) = self.code.as_deref().and_then(friendly_code_message) {
                return friendly.to_string();
            }
        }

        if self.message.trim().is_empty() {
            fallback.to_string()
        } else {
            self.message.clone()
        }
    }
}

/// Friendly copy for the error codes the console knows about.
pub fn friendly_code_message(code: &str) -> Option<&'static str> {
    match code {
        "CONFLICT" => Some("This item conflicts with an existing one"),
        "FORBIDDEN" => Some("You do not have permission to perform this action"),
        "UNAUTHORIZED" => Some("Your session has expired, please sign in again"),
        "NOT_FOUND" => Some("The requested item could not be found"),
        _ => None,
    }
}

/// A message may be a single string or a list of strings joined with spaces.
/// Blank text counts as no message.
fn message_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

impl ErrorMetadata for ApiError {
    fn error_code(&self) -> &str {
        if let Some(code) = self.code.as_deref() {
            return code;
        }
        match self.status_code {
            400 => "BAD_REQUEST",
            401 => "UNAUTHORIZED",
            403 => "FORBIDDEN",
            404 => "NOT_FOUND",
            409 => "CONFLICT",
            413 => "PAYLOAD_TOO_LARGE",
            429 => "TOO_MANY_REQUESTS",
            500..=599 => "SERVER_ERROR",
            _ => "HTTP_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.is_server_error() || matches!(self.status_code, 408 | 429)
    }

    fn log_level(&self) -> LogLevel {
        match self.status_code {
            500..=599 => LogLevel::Error,
            401 | 403 | 429 => LogLevel::Warn,
            _ => LogLevel::Debug,
        }
    }
}
