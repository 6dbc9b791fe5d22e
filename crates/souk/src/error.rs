// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error codes surfaced by the client runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No credential, or login was rejected.
    Unauthenticated,
    /// Refresh failed or was not possible; credentials have been cleared.
    SessionExpired,
    Validation,
    Server,
    /// No response reached the client (connect failure, timeout).
    Network,
    ConflictOrNotFound,
    Storage,
    Decode,
    /// The conversation engine was closed.
    Closed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Validation => "VALIDATION_ERROR",
            Self::Server => "SERVER_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::ConflictOrNotFound => "CONFLICT_OR_NOT_FOUND",
            Self::Storage => "STORAGE_ERROR",
            Self::Decode => "DECODE_ERROR",
            Self::Closed => "CLOSED",
        }
    }

    /// Classify an HTTP error status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::SessionExpired,
            404 | 409 | 410 => Self::ConflictOrNotFound,
            429 | 500..=599 => Self::Server,
            _ => Self::Validation,
        }
    }

    /// Transient failures a caller may retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server | Self::Network)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure with one human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    /// HTTP status when a response was received.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, status: None, message: message.into() }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn session_expired() -> Self {
        Self::new(ErrorCode::SessionExpired, "Your session has expired. Please log in again.")
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn storage(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Storage, format!("local storage failed: {err}"))
    }

    pub fn decode(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Decode, format!("unexpected response from server: {err}"))
    }

    pub fn closed() -> Self {
        Self::new(ErrorCode::Closed, "conversation is closed")
    }

    /// Build an error from a non-success response status and body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|payload| payload_message(&payload))
            .unwrap_or_else(|| status_message(status));
        Self { code: ErrorCode::from_status(status), status: Some(status), message }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

/// Fixed user-facing text for a status code.
pub fn status_message(status: u16) -> String {
    match status {
        400 => "Invalid request. Please check your input.".to_owned(),
        401 => "Authentication required. Please log in.".to_owned(),
        403 => "You do not have permission to perform this action.".to_owned(),
        404 => "The requested resource was not found.".to_owned(),
        409 => "The request conflicts with the current state.".to_owned(),
        422 => "Some fields are invalid. Please check your input.".to_owned(),
        429 => "Too many requests. Please wait a moment and try again.".to_owned(),
        500..=599 => "Server error. Please try again later.".to_owned(),
        _ => format!("Request failed with status {status}."),
    }
}

/// Extract a message from an error payload.
///
/// Accepts `{"detail": "..."}`, `{"detail": [{"loc": [...], "msg": "..."}]}`
/// and `{"message": "..."}`.
pub fn payload_message(payload: &Value) -> Option<String> {
    match payload.get("detail") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let pairs: Vec<String> = items.iter().filter_map(field_message).collect();
            if !pairs.is_empty() {
                return Some(pairs.join("; "));
            }
        }
        _ => {}
    }
    payload.get("message").and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
}

fn field_message(item: &Value) -> Option<String> {
    let msg = item.get("msg").and_then(Value::as_str)?;
    let field = item.get("loc").and_then(Value::as_array).and_then(|loc| {
        loc.iter().rev().find_map(|part| match part {
            Value::String(s) if s != "body" && s != "query" && s != "path" => Some(s.clone()),
            _ => None,
        })
    });
    match field {
        Some(field) => Some(format!("{field}: {msg}")),
        None => Some(msg.to_owned()),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
