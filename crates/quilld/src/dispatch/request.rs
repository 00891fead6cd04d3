//! Transport-neutral request representation.

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;

/// Inbound HTTP request as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// Builds a request, splitting any query string off `target`.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => Self::from_path(method, path.to_owned(), Some(query)),
            None => Self::from_path(method, target.to_owned(), None),
        }
    }

    /// Builds a request from an already-decoded path and its raw query.
    ///
    /// The path is taken as is, so a decoded `?` stays part of it.
    #[must_use]
    pub fn from_path(method: Method, path: String, query: Option<&str>) -> Self {
        Self {
            method,
            path,
            query: query.map(str::to_owned),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Replaces the header map.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of query parameter `name`.
    ///
    /// Values are returned as sent; no percent-decoding is applied.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text.
    #[must_use]
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Reports whether this is a WebSocket upgrade request.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header_str(&UPGRADE)
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));
        let connection = self.headers.get_all(CONNECTION).iter().any(|value| {
            value.to_str().is_ok_and(|text| {
                text.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
            })
        });
        upgrade && connection
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn splits_query_from_path() {
        let request = Request::new(Method::GET, "/personal/plugin?uuid=abc123&x=1");
        assert_eq!(request.path(), "/personal/plugin");
        assert_eq!(request.query_param("uuid"), Some("abc123"));
        assert_eq!(request.query_param("x"), Some("1"));
        assert_eq!(request.query_param("missing"), None);
    }

    #[test]
    fn bare_query_key_has_empty_value() {
        let request = Request::new(Method::GET, "/p?flag");
        assert_eq!(request.query_param("flag"), Some(""));
    }

    #[rstest]
    #[case::standard("websocket", "Upgrade", true)]
    #[case::token_list("WebSocket", "keep-alive, Upgrade", true)]
    #[case::wrong_protocol("h2c", "Upgrade", false)]
    #[case::no_connection_token("websocket", "keep-alive", false)]
    fn detects_websocket_upgrade(
        #[case] upgrade: &'static str,
        #[case] connection: &'static str,
        #[case] expected: bool,
    ) {
        let request = Request::new(Method::GET, "/ws")
            .with_header(UPGRADE, HeaderValue::from_static(upgrade))
            .with_header(CONNECTION, HeaderValue::from_static(connection));
        assert_eq!(request.is_websocket_upgrade(), expected);
    }
}
