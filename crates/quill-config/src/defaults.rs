use std::env;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Address the HTTP listener binds when none is configured.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Web prefix under which the optional assets directory is published.
pub const DEFAULT_ASSETS_PREFIX: &str = "/static";

/// Number of dedicated ingestion threads.
pub const DEFAULT_INGEST_WORKERS: usize = 1;

/// Largest accepted upload body (24 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 24 * 1024 * 1024;

/// Largest number of entries accepted in a single plugin archive.
pub const DEFAULT_MAX_ARCHIVE_ENTRIES: usize = 4096;

/// Ceiling on the total uncompressed size of one extraction (256 MiB).
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 256 * 1024 * 1024;

/// Deepest directory nesting followed while publishing a static tree.
pub const DEFAULT_MAX_WALK_DEPTH: usize = 32;

/// Largest number of entries visited while publishing a static tree.
pub const DEFAULT_MAX_WALK_ENTRIES: usize = 20_000;

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the directory holding plugin, raw and scratch storage.
///
/// Prefers the platform's local data directory and falls back to the system
/// temporary directory when none is available or it is not valid UTF-8.
#[must_use]
pub fn default_storage_root() -> Utf8PathBuf {
    let base = dirs::data_local_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join("quill")
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
