//! HTTP adapter between axum and the dispatcher.
//!
//! Every request lands on one fallback handler. The body is buffered up to
//! the upload ceiling, the path is percent-decoded, and the result is
//! converted into a [`Request`] and served on the blocking pool because
//! handlers may read files or wait on ingestion.

use std::io;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response as HttpResponse;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, Request, Response};

/// Tracing target for the HTTP adapter.
pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Shared state handed to the fallback handler.
#[derive(Debug, Clone)]
pub struct TransportState {
    dispatcher: Arc<Dispatcher>,
    max_body_bytes: usize,
}

impl TransportState {
    /// Serves `dispatcher`, buffering at most `max_body_bytes` per request.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            max_body_bytes,
        }
    }
}

/// Builds the axum router.
#[must_use]
pub fn router(state: TransportState) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .fallback(dispatch_request)
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serves `state` on `listener` until Ctrl-C.
///
/// # Errors
///
/// Propagates I/O errors from the accept loop.
pub async fn serve(listener: TcpListener, state: TransportState) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(target: TRANSPORT_TARGET, %addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: TRANSPORT_TARGET, "shutdown requested"),
        Err(error) => {
            warn!(
                target: TRANSPORT_TARGET,
                %error,
                "cannot listen for Ctrl-C; serving until killed"
            );
            futures::future::pending::<()>().await;
        }
    }
}

async fn dispatch_request(
    State(state): State<TransportState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> HttpResponse {
    let bytes = match body {
        Ok(bytes) => bytes,
        Err(rejection) => return into_http(body_rejected(&rejection)),
    };

    let path = match percent_decode_str(uri.path()).decode_utf8() {
        Ok(path) => path,
        Err(error) => {
            debug!(target: TRANSPORT_TARGET, path = uri.path(), %error, "undecodable path");
            return into_http(Response::json_error(
                StatusCode::BAD_REQUEST,
                "bad_request",
                "request path is not valid UTF-8 once decoded",
            ));
        }
    };
    let inbound = Request::from_path(method, path.into_owned(), uri.query())
        .with_headers(headers)
        .with_body(bytes);

    let dispatcher = Arc::clone(&state.dispatcher);
    match tokio::task::spawn_blocking(move || dispatcher.serve(&inbound)).await {
        Ok(response) => into_http(response),
        Err(error) => {
            warn!(target: TRANSPORT_TARGET, %error, "handler task failed");
            into_http(Response::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "request handler failed",
            ))
        }
    }
}

fn body_rejected(rejection: &BytesRejection) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(target: TRANSPORT_TARGET, %rejection, "request body over the upload limit");
        return Response::json_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "request body exceeds the upload limit",
        );
    }
    warn!(target: TRANSPORT_TARGET, %rejection, "request body could not be read");
    Response::json_error(
        StatusCode::BAD_REQUEST,
        "bad_request",
        "request body could not be read",
    )
}

fn into_http(response: Response) -> HttpResponse {
    let (status, headers, body) = response.into_parts();
    let mut http = HttpResponse::new(Body::from(body));
    *http.status_mut() = status;
    *http.headers_mut() = headers;
    http
}

#[cfg(test)]
mod tests;
