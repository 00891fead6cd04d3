//! Tests for the axum adapter.

use std::fs;

use axum::body::to_bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use futures::stream;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tower::ServiceExt;

use super::*;
use crate::controllers::{HEALTH_ROUTE, healthz};
use crate::dispatch::{DispatcherBuilder, StaticIndex};

const LIMIT: usize = 64;

struct Harness {
    state: TransportState,
    _assets: TempDir,
}

#[fixture]
fn harness() -> Harness {
    let assets = TempDir::new().expect("temp dir");
    fs::write(assets.path().join("my file.txt"), "spaced").expect("write spaced file");
    fs::write(assets.path().join("café.txt"), "accented").expect("write accented file");
    let statics = Arc::new(StaticIndex::default());
    let report = statics
        .publish_tree("/static", assets.path())
        .expect("publish assets");
    assert_eq!(report.added, 2);

    let mut builder = DispatcherBuilder::new(statics);
    builder
        .register_exact(HEALTH_ROUTE, Arc::new(healthz))
        .expect("health route");
    builder
        .register_exact(
            "/echo",
            Arc::new(|request: &Request| {
                let body = format!(
                    "{} {} {} {}",
                    request.method(),
                    request.path(),
                    request.query().unwrap_or("-"),
                    request.body().len()
                );
                Response::new(StatusCode::OK, "text/plain", body)
            }),
        )
        .expect("echo route");
    Harness {
        state: TransportState::new(Arc::new(builder.build()), LIMIT),
        _assets: assets,
    }
}

fn inbound(method: Method, uri: &str, body: impl Into<Body>) -> axum::extract::Request {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .expect("request")
}

async fn send(harness: &Harness, request: axum::extract::Request) -> HttpResponse {
    router(harness.state.clone())
        .oneshot(request)
        .await
        .expect("router is infallible")
}

async fn body_text(response: HttpResponse) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[rstest]
#[tokio::test]
async fn routes_through_the_dispatcher(harness: Harness) {
    let response = send(&harness, inbound(Method::GET, HEALTH_ROUTE, Body::empty())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE),
        Some(&HeaderValue::from_static("application/json"))
    );
    assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
}

#[rstest]
#[tokio::test]
async fn keeps_method_query_and_body(harness: Harness) {
    let response = send(&harness, inbound(Method::PUT, "/echo?uuid=abc", "hello")).await;

    assert_eq!(body_text(response).await, "PUT /echo uuid=abc 5");
}

#[rstest]
#[case::space("/static/my%20file.txt", "spaced")]
#[case::multibyte("/static/caf%C3%A9.txt", "accented")]
#[tokio::test]
async fn encoded_static_paths_are_decoded(
    harness: Harness,
    #[case] target: &str,
    #[case] expected: &str,
) {
    let response = send(&harness, inbound(Method::GET, target, Body::empty())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, expected);
}

#[rstest]
#[tokio::test]
async fn decoded_question_mark_stays_in_the_path(harness: Harness) {
    let response = send(&harness, inbound(Method::GET, "/echo%3Fx?y=1", Body::empty())).await;

    // The exact route does not match, so this is a plain miss.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn undecodable_paths_are_bad_requests(harness: Harness) {
    let response = send(&harness, inbound(Method::GET, "/static/%FF.txt", Body::empty())).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn oversized_bodies_are_rejected(harness: Harness) {
    let response = send(&harness, inbound(Method::POST, "/echo", vec![0_u8; LIMIT + 1])).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[rstest]
#[tokio::test]
async fn broken_bodies_are_bad_requests(harness: Harness) {
    let chunks = stream::iter([
        Ok(Bytes::from_static(b"part")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ]);
    let response = send(&harness, inbound(Method::POST, "/echo", Body::from_stream(chunks))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn misses_are_plain_not_found(harness: Harness) {
    let response = send(&harness, inbound(Method::GET, "/nowhere", Body::empty())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "404 page not found\n");
}
