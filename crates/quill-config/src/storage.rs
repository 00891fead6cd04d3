//! Derives the on-disk storage layout shared by the daemon and its tools.
//!
//! Three directories are involved: the canonical plugin root (served
//! publicly), the raw archive root (kept private), and a scratch root for
//! uploads and extraction. The layout is created eagerly so later writes can
//! assume the parents exist.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// Canonical storage directories derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    plugin_root: Utf8PathBuf,
    raw_root: Utf8PathBuf,
    tmp_root: Utf8PathBuf,
}

impl StorageLayout {
    /// Resolves the layout from configuration and creates each directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageLayoutError::Directory`] naming the first directory
    /// that could not be created.
    pub fn from_config(config: &Config) -> Result<Self, StorageLayoutError> {
        let layout = Self {
            plugin_root: config.plugin_root(),
            raw_root: config.raw_root(),
            tmp_root: config.tmp_root(),
        };
        for dir in [&layout.plugin_root, &layout.raw_root, &layout.tmp_root] {
            fs::create_dir_all(dir).map_err(|source| StorageLayoutError::Directory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(layout)
    }

    /// Directory of canonical plugin installs.
    #[must_use]
    pub fn plugin_root(&self) -> &Utf8Path {
        &self.plugin_root
    }

    /// Directory of original uploaded archives.
    #[must_use]
    pub fn raw_root(&self) -> &Utf8Path {
        &self.raw_root
    }

    /// Scratch directory.
    #[must_use]
    pub fn tmp_root(&self) -> &Utf8Path {
        &self.tmp_root
    }
}

/// Errors raised while preparing the storage layout.
#[derive(Debug, Error)]
pub enum StorageLayoutError {
    /// Creating a storage directory failed.
    #[error("failed to prepare storage directory '{path}': {source}")]
    Directory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("temp path should be UTF-8")
    }

    #[test]
    fn creates_all_directories_under_storage_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = utf8(dir.path()).join("state");
        let config = Config {
            storage_root: Some(root.clone()),
            ..Config::default()
        };

        let layout = StorageLayout::from_config(&config).expect("layout should be created");

        assert_eq!(layout.plugin_root(), root.join("plugin"));
        assert!(layout.plugin_root().is_dir());
        assert!(layout.raw_root().is_dir());
        assert!(layout.tmp_root().is_dir());
    }

    #[test]
    fn reports_directory_that_cannot_be_created() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = utf8(dir.path()).join("file");
        fs::write(&blocker, b"not a directory").expect("write blocker");
        let config = Config {
            storage_root: Some(blocker.clone()),
            ..Config::default()
        };

        let error = StorageLayout::from_config(&config).expect_err("layout must fail");

        let StorageLayoutError::Directory { path, .. } = error;
        assert_eq!(path, blocker.join("plugin"));
    }
}
