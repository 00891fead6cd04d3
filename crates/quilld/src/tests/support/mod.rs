//! Shared fixtures for the daemon test suites.

mod config_loader;
mod reporter;
mod world;

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};

use quill_plugins::{ChannelSupervisor, LifecycleSignal, MemoryPluginStore};

use crate::bootstrap::{Daemon, bootstrap_with};
use crate::controllers::{PLUGIN_ROUTE, UPLOAD_FIELD};
use crate::dispatch::{Request, Response};

pub use self::config_loader::{FailingConfigLoader, TestConfigLoader};
pub use self::reporter::{HealthEvent, RecordingHealthReporter};
pub use self::world::DaemonWorld;

const BOUNDARY: &str = "quill-test-boundary";

/// A bootstrapped daemon plus every collaborator tests inspect.
pub struct TestDaemon {
    pub daemon: Daemon,
    pub loader: TestConfigLoader,
    pub reporter: Arc<RecordingHealthReporter>,
    pub store: Arc<MemoryPluginStore>,
    pub signals: Receiver<LifecycleSignal>,
}

impl TestDaemon {
    /// Boots against a fresh temporary storage root.
    pub fn start() -> Self {
        Self::start_with(TestConfigLoader::new())
    }

    /// Boots with a prepared loader.
    pub fn start_with(loader: TestConfigLoader) -> Self {
        let reporter = Arc::new(RecordingHealthReporter::default());
        let store = Arc::new(MemoryPluginStore::new());
        let (sender, signals) = mpsc::channel();
        let daemon = bootstrap_with(
            &loader,
            reporter.clone(),
            store.clone(),
            Arc::new(ChannelSupervisor::new(sender)),
        )
        .expect("bootstrap should succeed");
        Self {
            daemon,
            loader,
            reporter,
            store,
            signals,
        }
    }

    /// Runs one request through the dispatcher.
    pub fn serve(&self, request: &Request) -> Response {
        self.daemon.dispatcher().serve(request)
    }

    /// Uploads `archive` as the `raw` form field.
    pub fn upload(&self, archive: &[u8]) -> Response {
        self.serve(&upload_request(UPLOAD_FIELD, archive))
    }

    /// Fetches a path with `GET`.
    pub fn get(&self, target: &str) -> Response {
        self.serve(&Request::new(Method::GET, target))
    }

    /// Stop requests received by the supervisor so far.
    pub fn stop_signals(&self) -> Vec<LifecycleSignal> {
        self.signals.try_iter().collect()
    }
}

/// Builds a multipart upload of `payload` under `field`.
pub fn upload_request(field: &str, payload: &[u8]) -> Request {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"plugin.zip\"\r\n\
         Content-Type: application/zip\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
    Request::new(Method::POST, PLUGIN_ROUTE)
        .with_header(
            CONTENT_TYPE,
            HeaderValue::from_str(&content_type).expect("content type header"),
        )
        .with_body(body)
}

/// Parses a JSON Lines body.
pub fn json_lines(response: &Response) -> Vec<serde_json::Value> {
    std::str::from_utf8(response.body())
        .expect("utf-8 body")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

/// Last line of a JSON Lines body.
pub fn terminal_line(response: &Response) -> serde_json::Value {
    json_lines(response).pop().expect("at least one line")
}
