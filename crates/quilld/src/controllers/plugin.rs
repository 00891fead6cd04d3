//! Upload and download endpoint for plugin archives.
//!
//! `POST` takes a multipart form whose `raw` field carries the packaged
//! archive. The archive is spooled under the scratch root, handed to the
//! ingestion worker, and the run's events come back as JSON Lines: one
//! `progress` line per event, then a single `complete` or `failed` line.
//! `GET ?uuid=` returns the stored raw archive as an attachment.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures::executor::block_on;
use multer::{Constraints, Multipart, SizeLimit};
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use quill_plugins::{
    IngestAction, IngestError, IngestEvent, IngestOutcome, IngestionWorker, RawArchives,
};

use crate::dispatch::{Handler, JsonLines, Request, Response, StaticIndex};
use crate::health::HealthReporter;

use super::CONTROLLER_TARGET;

/// Path the controller is registered on.
pub const PLUGIN_ROUTE: &str = "/personal/plugin";
/// Web prefix installed plugins are published under.
pub const PLUGIN_PUBLIC_PREFIX: &str = "/plugin";
/// Multipart field carrying the archive.
pub const UPLOAD_FIELD: &str = "raw";

const ALLOWED_METHODS: &str = "GET, POST";
const APPLICATION_ZIP: &str = "application/zip";

/// Scratch location and body ceiling for uploads.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Directory uploads are spooled into.
    pub tmp_root: PathBuf,
    /// Largest accepted multipart body.
    pub max_upload_bytes: usize,
}

/// Handles `/personal/plugin`.
pub struct PluginController {
    worker: Arc<IngestionWorker>,
    raw: RawArchives,
    statics: Arc<StaticIndex>,
    reporter: Arc<dyn HealthReporter>,
    settings: UploadSettings,
}

impl PluginController {
    /// Wires the controller to its collaborators.
    #[must_use]
    pub fn new(
        worker: Arc<IngestionWorker>,
        raw: RawArchives,
        statics: Arc<StaticIndex>,
        reporter: Arc<dyn HealthReporter>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            worker,
            raw,
            statics,
            reporter,
            settings,
        }
    }

    fn upload(&self, request: &Request) -> Response {
        let spool = match self.spool_upload(request) {
            Ok(spool) => spool,
            Err(rejection) => return rejection.into_response(),
        };
        let task = self.worker.submit(spool.path().to_path_buf());

        let mut lines = JsonLines::new();
        let mut terminal = None;
        for event in task {
            match event {
                IngestEvent::Progress(progress) => lines.push(&json!({
                    "kind": "progress",
                    "stage": progress.stage.as_str(),
                    "level": progress.level.as_str(),
                    "message": progress.message,
                })),
                IngestEvent::Finished(result) => terminal = Some(result),
            }
        }
        // Held until the run finishes reading it.
        drop(spool);

        match terminal.unwrap_or(Err(IngestError::WorkerUnavailable)) {
            Ok(outcome) => {
                self.publish(&outcome);
                lines.push(&complete_line(&outcome));
                lines.into_response(StatusCode::OK)
            }
            Err(error) => {
                warn!(
                    target: CONTROLLER_TARGET,
                    kind = error.kind(),
                    error = %error,
                    "plugin upload failed"
                );
                lines.push(&json!({
                    "kind": "failed",
                    "error": error.kind(),
                    "message": error.to_string(),
                }));
                let status = StatusCode::from_u16(error.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                lines.into_response(status)
            }
        }
    }

    fn spool_upload(&self, request: &Request) -> Result<NamedTempFile, Rejection> {
        let content_type = request
            .header_str(&CONTENT_TYPE)
            .ok_or_else(|| Rejection::bad_request("expected a multipart/form-data body"))?;
        let boundary = multer::parse_boundary(content_type)
            .map_err(|error| Rejection::bad_request(&error.to_string()))?;

        let limit = u64::try_from(self.settings.max_upload_bytes).unwrap_or(u64::MAX);
        let constraints =
            Constraints::new().size_limit(SizeLimit::new().whole_stream(limit).per_field(limit));
        let body = request.body().clone();
        let stream = futures::stream::once(async move { Ok::<Bytes, io::Error>(body) });
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        block_on(self.receive_archive(&mut multipart))
    }

    async fn receive_archive(
        &self,
        multipart: &mut Multipart<'static>,
    ) -> Result<NamedTempFile, Rejection> {
        while let Some(mut field) = multipart.next_field().await.map_err(Rejection::multipart)? {
            if field.name() != Some(UPLOAD_FIELD) {
                debug!(
                    target: CONTROLLER_TARGET,
                    field = field.name().unwrap_or_default(),
                    "ignoring form field"
                );
                continue;
            }
            let tmp_root = &self.settings.tmp_root;
            let mut spool = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(".zip")
                .tempfile_in(tmp_root)
                .map_err(|error| Rejection::spool(tmp_root, &error))?;
            while let Some(chunk) = field.chunk().await.map_err(Rejection::multipart)? {
                spool
                    .write_all(&chunk)
                    .map_err(|error| Rejection::spool(spool.path(), &error))?;
            }
            spool
                .flush()
                .map_err(|error| Rejection::spool(spool.path(), &error))?;
            return Ok(spool);
        }
        Err(Rejection::bad_request("form field 'raw' is missing"))
    }

    fn publish(&self, outcome: &IngestOutcome) {
        let prefix = format!("{PLUGIN_PUBLIC_PREFIX}/{}", outcome.record.uuid);
        match self.statics.publish_tree(&prefix, &outcome.install_dir) {
            Ok(report) => self.reporter.static_tree_published(&prefix, &report),
            Err(error) => self.reporter.static_tree_failed(&prefix, &error),
        }
        self.reporter.plugin_installed(outcome);
    }

    fn download(&self, request: &Request) -> Response {
        let Some(uuid) = request.query_param("uuid").filter(|uuid| !uuid.is_empty()) else {
            return Response::json_error(
                StatusCode::BAD_REQUEST,
                "bad_request",
                "query parameter 'uuid' is required",
            );
        };
        let mut contents = Vec::new();
        let read = self
            .raw
            .open(uuid)
            .and_then(|mut file| {
                file.read_to_end(&mut contents).map_err(|error| {
                    IngestError::filesystem("read", &self.raw.path_for(uuid), error)
                })
            });
        match read {
            Ok(_) => {
                let disposition = format!("attachment; filename=\"{uuid}.zip\"");
                let response = Response::new(StatusCode::OK, APPLICATION_ZIP, contents);
                match HeaderValue::from_str(&disposition) {
                    Ok(value) => response.with_header(CONTENT_DISPOSITION, value),
                    Err(_) => response,
                }
            }
            Err(IngestError::Filesystem { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                Response::not_found()
            }
            Err(error) => {
                let status = StatusCode::from_u16(error.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Response::json_error(status, error.kind(), &error.to_string())
            }
        }
    }
}

impl Handler for PluginController {
    fn handle(&self, request: &Request) -> Response {
        match *request.method() {
            Method::POST => self.upload(request),
            Method::GET => self.download(request),
            _ => Response::method_not_allowed(ALLOWED_METHODS),
        }
    }
}

fn complete_line(outcome: &IngestOutcome) -> Value {
    let record = &outcome.record;
    json!({
        "kind": "complete",
        "id": record.id.get(),
        "uuid": record.uuid,
        "name": record.name,
        "version": record.version,
        "type": record.plugin_type.to_string(),
        "action": match outcome.action {
            IngestAction::Inserted => "inserted",
            IngestAction::Updated => "updated",
        },
        "created_at": record.created_at.format(&Rfc3339).ok(),
    })
}

/// Upload refused before ingestion started.
struct Rejection {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl Rejection {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.to_owned(),
        }
    }

    fn multipart(error: multer::Error) -> Self {
        let status = match error {
            multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            kind: "bad_request",
            message: error.to_string(),
        }
    }

    fn spool(path: &Path, error: &io::Error) -> Self {
        warn!(
            target: CONTROLLER_TARGET,
            path = %path.display(),
            %error,
            "failed to spool upload"
        );
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "filesystem",
            message: "failed to store upload".to_owned(),
        }
    }

    fn into_response(self) -> Response {
        Response::json_error(self.status, self.kind, &self.message)
    }
}
