//! Transport-neutral response representation and JSONL body helper.

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde_json::Value;

const NOT_FOUND_BODY: &str = "404 page not found\n";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";
/// Content type of JSON Lines bodies.
pub const APPLICATION_NDJSON: &str = "application/x-ndjson";

/// Outbound HTTP response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Builds a response with a content type.
    #[must_use]
    pub fn new(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Fixed-body 404.
    ///
    /// The body never varies, so a miss reveals nothing about the route
    /// tables.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, TEXT_PLAIN, NOT_FOUND_BODY)
    }

    /// JSON document.
    #[must_use]
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status, APPLICATION_JSON, value.to_string())
    }

    /// JSON error object `{"error": kind, "message": message}`.
    #[must_use]
    pub fn json_error(status: StatusCode, kind: &str, message: &str) -> Self {
        Self::json(
            status,
            &serde_json::json!({ "error": kind, "message": message }),
        )
    }

    /// 405 listing the allowed methods.
    #[must_use]
    pub fn method_not_allowed(allowed: &'static str) -> Self {
        Self::json_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not supported on this route",
        )
        .with_header(ALLOW, HeaderValue::from_static(allowed))
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Drops the body, keeping status and headers (for `HEAD`).
    #[must_use]
    pub fn without_body(mut self) -> Self {
        self.body = Bytes::new();
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Splits into parts for the transport.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// Accumulates a JSON Lines body.
#[derive(Debug, Default)]
pub struct JsonLines {
    buffer: String,
}

impl JsonLines {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line.
    pub fn push(&mut self, value: &Value) {
        self.buffer.push_str(&value.to_string());
        self.buffer.push('\n');
    }

    /// Finishes the body as a response.
    #[must_use]
    pub fn into_response(self, status: StatusCode) -> Response {
        Response::new(status, APPLICATION_NDJSON, self.buffer)
    }
}
