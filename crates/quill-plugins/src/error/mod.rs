//! Domain errors raised while ingesting and registering plugins.
//!
//! I/O failures are wrapped in `Arc` so errors stay cheap to clone when a
//! terminal result is handed from a worker thread to the waiting request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::IngestStage;

/// Failure reported by a [`crate::PluginStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A row for this uuid already exists.
    #[error("plugin '{uuid}' is already registered")]
    Duplicate {
        /// Conflicting plugin uuid.
        uuid: String,
    },
    /// No row carries the requested internal id.
    #[error("plugin row {id} does not exist")]
    MissingRow {
        /// Internal id that was looked up.
        id: u64,
    },
    /// The backing store could not serve the request.
    #[error("plugin store unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the outage.
        message: String,
    },
}

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// The upload or its embedded code archive could not be unpacked.
    #[error("failed to extract '{path}': {message}")]
    Extraction {
        /// Archive being extracted.
        path: PathBuf,
        /// Description of the failure.
        message: String,
        /// Underlying I/O error, when there is one.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The descriptor or archive layout is unacceptable.
    #[error("invalid plugin: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// Reading or writing the registry failed.
    #[error("plugin registry failure for '{uuid}': {source}")]
    Persistence {
        /// Plugin uuid being registered.
        uuid: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// A filesystem move, removal or creation failed.
    #[error("failed to {operation} '{path}': {source}")]
    Filesystem {
        /// Short verb describing the operation.
        operation: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The caller cancelled the task before the given stage began.
    #[error("ingestion cancelled before {stage}")]
    Cancelled {
        /// Stage that was not started.
        stage: IngestStage,
    },

    /// The background worker has shut down.
    #[error("plugin ingestion worker is not running")]
    WorkerUnavailable,
}

impl IngestError {
    /// Builds an [`IngestError::Extraction`] without an I/O source.
    #[must_use]
    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Builds an [`IngestError::Extraction`] wrapping an I/O error.
    #[must_use]
    pub fn extraction_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Extraction {
            path: path.into(),
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Builds an [`IngestError::Validation`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds an [`IngestError::Persistence`].
    #[must_use]
    pub fn persistence(uuid: &str, source: StoreError) -> Self {
        Self::Persistence {
            uuid: uuid.to_owned(),
            source,
        }
    }

    /// Builds an [`IngestError::Filesystem`].
    #[must_use]
    pub fn filesystem(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            operation,
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    /// Stable snake_case tag for the error category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::Validation { .. } => "validation",
            Self::Persistence { .. } => "persistence",
            Self::Filesystem { .. } => "filesystem",
            Self::Cancelled { .. } => "cancelled",
            Self::WorkerUnavailable => "worker_unavailable",
        }
    }

    /// HTTP status code an upload endpoint should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Extraction { .. } => 400,
            Self::Validation { .. } => 422,
            Self::Cancelled { .. } => 409,
            Self::WorkerUnavailable => 503,
            Self::Persistence { .. } | Self::Filesystem { .. } => 500,
        }
    }
}
