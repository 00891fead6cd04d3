//! Shared configuration for the quill daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults are
//! overridden by a TOML file (`--config-path` or `QUILL_CONFIG_PATH`), then by
//! `QUILL_*` environment variables, then by command-line flags. Every field is
//! optional in the sources; scalar defaults seed the lowest layer and the
//! accessor methods on [`Config`] resolve the rest, so callers never see an
//! unset field.

mod defaults;
mod logging;
mod storage;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ASSETS_PREFIX, DEFAULT_INGEST_WORKERS, DEFAULT_LISTEN_ADDR, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_ARCHIVE_ENTRIES, DEFAULT_MAX_EXTRACTED_BYTES, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_MAX_WALK_DEPTH, DEFAULT_MAX_WALK_ENTRIES, default_log_filter, default_log_format,
    default_storage_root,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use storage::{StorageLayout, StorageLayoutError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "QUILL")]
pub struct Config {
    /// Socket address of the HTTP listener.
    #[ortho_config(default = String::from(DEFAULT_LISTEN_ADDR))]
    pub listen_addr: Option<String>,
    /// `tracing` filter expression.
    #[ortho_config(default = String::from(DEFAULT_LOG_FILTER))]
    pub log_filter: Option<String>,
    /// Encoding of emitted log lines.
    pub log_format: Option<LogFormat>,
    /// Base directory for plugin, raw and scratch storage.
    pub storage_root: Option<Utf8PathBuf>,
    /// Directory holding canonical plugin installs.
    pub plugin_root: Option<Utf8PathBuf>,
    /// Private directory holding the original uploaded archives.
    pub raw_root: Option<Utf8PathBuf>,
    /// Scratch directory for uploads and extraction.
    pub tmp_root: Option<Utf8PathBuf>,
    /// Optional local directory of site assets to publish.
    pub assets_dir: Option<Utf8PathBuf>,
    /// Web prefix for `assets_dir`.
    #[ortho_config(default = String::from(DEFAULT_ASSETS_PREFIX))]
    pub assets_prefix: Option<String>,
    /// Number of dedicated ingestion threads.
    #[ortho_config(default = DEFAULT_INGEST_WORKERS)]
    pub ingest_workers: Option<usize>,
    /// Largest accepted request body in bytes.
    #[ortho_config(default = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: Option<usize>,
    /// Largest number of entries in one plugin archive.
    #[ortho_config(default = DEFAULT_MAX_ARCHIVE_ENTRIES)]
    pub max_archive_entries: Option<usize>,
    /// Ceiling on total uncompressed bytes per extraction.
    #[ortho_config(default = DEFAULT_MAX_EXTRACTED_BYTES)]
    pub max_extracted_bytes: Option<u64>,
    /// Deepest nesting followed when publishing a static tree.
    #[ortho_config(default = DEFAULT_MAX_WALK_DEPTH)]
    pub max_walk_depth: Option<usize>,
    /// Largest number of entries visited when publishing a static tree.
    #[ortho_config(default = DEFAULT_MAX_WALK_ENTRIES)]
    pub max_walk_entries: Option<usize>,
}

impl Config {
    /// Address the HTTP listener binds.
    #[must_use]
    pub fn listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output encoding.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Base storage directory.
    #[must_use]
    pub fn storage_root(&self) -> Utf8PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(default_storage_root)
    }

    /// Canonical plugin install root (`<storage_root>/plugin` by default).
    #[must_use]
    pub fn plugin_root(&self) -> Utf8PathBuf {
        self.storage_dir(self.plugin_root.as_deref(), "plugin")
    }

    /// Raw archive root (`<storage_root>/raw` by default).
    #[must_use]
    pub fn raw_root(&self) -> Utf8PathBuf {
        self.storage_dir(self.raw_root.as_deref(), "raw")
    }

    /// Scratch root (`<storage_root>/tmp` by default).
    #[must_use]
    pub fn tmp_root(&self) -> Utf8PathBuf {
        self.storage_dir(self.tmp_root.as_deref(), "tmp")
    }

    /// Site assets directory, when one is configured.
    #[must_use]
    pub fn assets_dir(&self) -> Option<&Utf8Path> {
        self.assets_dir.as_deref()
    }

    /// Web prefix for the assets directory.
    #[must_use]
    pub fn assets_prefix(&self) -> &str {
        self.assets_prefix.as_deref().unwrap_or(DEFAULT_ASSETS_PREFIX)
    }

    /// Number of ingestion threads; never less than one.
    #[must_use]
    pub fn ingest_workers(&self) -> usize {
        self.ingest_workers.unwrap_or(DEFAULT_INGEST_WORKERS).max(1)
    }

    /// Largest accepted request body.
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }

    /// Largest number of entries in one archive.
    #[must_use]
    pub fn max_archive_entries(&self) -> usize {
        self.max_archive_entries
            .unwrap_or(DEFAULT_MAX_ARCHIVE_ENTRIES)
    }

    /// Ceiling on uncompressed bytes per extraction.
    #[must_use]
    pub fn max_extracted_bytes(&self) -> u64 {
        self.max_extracted_bytes
            .unwrap_or(DEFAULT_MAX_EXTRACTED_BYTES)
    }

    /// Deepest static walk nesting.
    #[must_use]
    pub fn max_walk_depth(&self) -> usize {
        self.max_walk_depth.unwrap_or(DEFAULT_MAX_WALK_DEPTH)
    }

    /// Largest static walk entry count.
    #[must_use]
    pub fn max_walk_entries(&self) -> usize {
        self.max_walk_entries.unwrap_or(DEFAULT_MAX_WALK_ENTRIES)
    }

    fn storage_dir(&self, explicit: Option<&Utf8Path>, leaf: &str) -> Utf8PathBuf {
        explicit.map_or_else(|| self.storage_root().join(leaf), Utf8Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_sources() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.log_filter(), default_log_filter());
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.assets_prefix(), "/static");
        assert_eq!(config.ingest_workers(), 1);
        assert_eq!(config.max_upload_bytes(), 24 * 1024 * 1024);
        assert!(config.assets_dir().is_none());
    }

    #[test]
    fn storage_directories_follow_root() {
        let config = Config {
            storage_root: Some(Utf8PathBuf::from("/srv/quill")),
            ..Config::default()
        };
        assert_eq!(config.plugin_root(), Utf8PathBuf::from("/srv/quill/plugin"));
        assert_eq!(config.raw_root(), Utf8PathBuf::from("/srv/quill/raw"));
        assert_eq!(config.tmp_root(), Utf8PathBuf::from("/srv/quill/tmp"));
    }

    #[test]
    fn explicit_directories_override_root() {
        let config = Config {
            storage_root: Some(Utf8PathBuf::from("/srv/quill")),
            raw_root: Some(Utf8PathBuf::from("/private/raw")),
            ..Config::default()
        };
        assert_eq!(config.raw_root(), Utf8PathBuf::from("/private/raw"));
        assert_eq!(config.plugin_root(), Utf8PathBuf::from("/srv/quill/plugin"));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let config = Config {
            ingest_workers: Some(0),
            ..Config::default()
        };
        assert_eq!(config.ingest_workers(), 1);
    }
}
