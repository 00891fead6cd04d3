//! Private storage of the original uploaded archives.
//!
//! `<raw_root>/<uuid>.zip` is an audit and download copy; it is never
//! published through the static index.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::INGEST_TARGET;
use crate::descriptor::validate_uuid;
use crate::error::IngestError;

/// Directory of raw archive copies.
#[derive(Debug, Clone)]
pub struct RawArchives {
    root: PathBuf,
}

impl RawArchives {
    /// Uses `root` as the raw archive directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the copies.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the copy for `uuid`.
    #[must_use]
    pub fn path_for(&self, uuid: &str) -> PathBuf {
        self.root.join(format!("{uuid}.zip"))
    }

    /// Opens the stored archive for `uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for unsafe uuids and the
    /// underlying I/O error (typically `NotFound`) otherwise.
    pub fn open(&self, uuid: &str) -> Result<File, IngestError> {
        validate_uuid(uuid)?;
        let path = self.path_for(uuid);
        File::open(&path).map_err(|error| IngestError::filesystem("open", &path, error))
    }

    /// Replaces the copy for `uuid` with `upload`, keeping the previous copy
    /// until the caller commits or rolls back.
    pub(crate) fn replace(&self, uuid: &str, upload: &Path) -> Result<RawReplacement, IngestError> {
        let target = self.path_for(uuid);
        let mut staged = NamedTempFile::new_in(&self.root)
            .map_err(|error| IngestError::filesystem("create", &self.root, error))?;
        let mut source =
            File::open(upload).map_err(|error| IngestError::filesystem("open", upload, error))?;
        io::copy(&mut source, staged.as_file_mut())
            .map_err(|error| IngestError::filesystem("copy", upload, error))?;

        let backup = self.root.join(format!(".{uuid}.zip.previous"));
        let had_previous = target.is_file();
        if had_previous {
            fs::rename(&target, &backup)
                .map_err(|error| IngestError::filesystem("back up", &target, error))?;
        }
        if let Err(error) = staged.persist(&target) {
            if had_previous {
                restore(&backup, &target);
            }
            return Err(IngestError::filesystem("persist", &target, error.error));
        }
        Ok(RawReplacement {
            target,
            backup: had_previous.then_some(backup),
        })
    }
}

/// A raw copy written but not yet committed.
#[derive(Debug)]
pub(crate) struct RawReplacement {
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl RawReplacement {
    /// Discards the previous copy.
    pub(crate) fn commit(self) {
        if let Some(backup) = self.backup {
            discard(&backup);
        }
    }

    /// Restores the previous copy, or removes the new one if none existed.
    pub(crate) fn rollback(self) {
        match self.backup {
            Some(backup) => restore(&backup, &self.target),
            None => discard(&self.target),
        }
    }
}

fn restore(backup: &Path, target: &Path) {
    if let Err(error) = fs::rename(backup, target) {
        warn!(
            target: INGEST_TARGET,
            path = %target.display(),
            %error,
            "failed to restore previous raw archive"
        );
    }
}

fn discard(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        warn!(
            target: INGEST_TARGET,
            path = %path.display(),
            %error,
            "failed to remove raw archive"
        );
    }
}
