//! Liveness check.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::dispatch::{Request, Response};

/// Path the liveness check is registered on.
pub const HEALTH_ROUTE: &str = "/healthz";

/// Answers `{"status":"ok"}` while the process serves requests.
#[must_use]
pub fn healthz(request: &Request) -> Response {
    match *request.method() {
        Method::GET => Response::json(StatusCode::OK, &json!({ "status": "ok" })),
        Method::HEAD => Response::json(StatusCode::OK, &json!({ "status": "ok" })).without_body(),
        _ => Response::method_not_allowed("GET, HEAD"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn reports_ok() {
        let response = healthz(&Request::new(Method::GET, HEALTH_ROUTE));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"{"status":"ok"}"#);
    }

    #[rstest]
    fn rejects_writes() {
        let response = healthz(&Request::new(Method::DELETE, HEALTH_ROUTE));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
