// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-data HTTP requests/responses and the transport seam.
//!
//! [`Transport`] performs exactly one round trip and knows nothing about
//! credentials. [`HttpTransport`] is the reqwest-backed implementation used
//! in production; tests substitute a scripted transport.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A request relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        let mut req = Self::new(Method::Post, path);
        req.body = Body::Json(body);
        req
    }

    pub fn post_form(path: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let mut req = Self::new(Method::Post, path);
        req.body =
            Body::Form(fields.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect());
        req
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    /// Path plus URL-encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let params: Vec<(&str, &str)> =
            self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        format!("{}?{}", self.path, urlencoded(&params))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }
}

/// A received response. Any status counts as a response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(ApiError::decode)
    }
}

/// One HTTP round trip. Returns `Err` only when no response was received.
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>>;
}

/// reqwest-backed transport bound to one API base URL.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path_and_query());
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Body::Empty => builder,
            Body::Json(ref value) => builder.json(value),
            Body::Form(ref fields) => builder.form(fields),
        };

        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport_error)?;
        tracing::trace!(method = request.method.as_str(), path = %request.path, status, "http");
        Ok(ApiResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, ApiError>> {
        Box::pin(self.execute(request))
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::network("The request timed out. Check your connection and try again.")
    } else if e.is_connect() {
        ApiError::network("Unable to reach the server. Check your connection.")
    } else {
        ApiError::network(format!("network error: {e}"))
    }
}

/// Build a URL-encoded `k=v&k=v` string.
pub fn urlencoded(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_appended_and_encoded() {
        let req = ApiRequest::get("/api/messages/conversation/1/2")
            .with_query("skip", 0)
            .with_query("limit", 50)
            .with_query("q", "héllo world&x");
        assert_eq!(
            req.path_and_query(),
            "/api/messages/conversation/1/2?skip=0&limit=50&q=h%C3%A9llo%20world%26x"
        );
    }

    #[test]
    fn path_without_query_is_unchanged() {
        assert_eq!(ApiRequest::get("/api/messages/unread/count").path_and_query(), "/api/messages/unread/count");
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = ApiRequest::get("/x");
        req.set_header("authorization", "Bearer A1");
        req.set_header("Authorization", "Bearer A2");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer A2"));
        req.remove_header("authorization");
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn response_success_range() {
        assert!(ApiResponse { status: 201, body: String::new() }.is_success());
        assert!(!ApiResponse { status: 401, body: String::new() }.is_success());
    }

    #[test]
    fn response_json_decode_error_is_typed() {
        let resp = ApiResponse { status: 200, body: "not json".into() };
        let err = resp.json::<serde_json::Value>().err();
        assert_eq!(err.map(|e| e.code), Some(crate::error::ErrorCode::Decode));
    }
}
