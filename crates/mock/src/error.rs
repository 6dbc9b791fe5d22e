// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Error categories of the mock API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Internal,
}

impl MockError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Validation => 422,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::Internal => "INTERNAL",
        }
    }

    /// A failure whose body is `{"detail": message}`.
    pub fn detail(self, message: impl Into<String>) -> Failure {
        Failure { code: self, detail: Value::String(message.into()) }
    }

    pub fn to_http_response(&self, detail: Value) -> (StatusCode, Json<Value>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "detail": detail })))
    }
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error response in the backend's `{"detail": ...}` shape.
#[derive(Debug, Clone)]
pub struct Failure {
    pub code: MockError,
    pub detail: Value,
}

impl Failure {
    /// 422 with one field-level entry, `loc` rooted at the request body.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self {
            code: MockError::Validation,
            detail: json!([{ "loc": ["body", field], "msg": message.into(), "type": "value_error" }]),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        if self.code == MockError::Unauthorized {
            let (status, body) = self.code.to_http_response(self.detail);
            return (status, [("www-authenticate", "Bearer")], body).into_response();
        }
        self.code.to_http_response(self.detail).into_response()
    }
}
