//! Staged installation of a plugin into its canonical directory.
//!
//! Artifacts are assembled in a scratch directory under
//! `<plugin_root>/.staging`, which shares a filesystem with the canonical
//! location so the final swap is a pair of renames. The previous install is
//! kept inside the scratch directory until the caller either finishes the
//! install (dropping it) or rolls back (restoring it). A crash between the
//! two renames leaves the previous install parked; [`purge_staging`] moves
//! it back before clearing the staging area.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::INGEST_TARGET;
use crate::archive::{ExtractionLimits, extract_zip, meaningful_entries, move_file};
use crate::descriptor::{DESCRIPTOR_FILE, validate_uuid};
use crate::error::IngestError;

/// Staging area name inside the plugin root.
pub const STAGING_DIR: &str = ".staging";
/// Large cover image.
pub const BIG_COVER: &str = "big_cover.jpg";
/// Small cover image.
pub const SMALL_COVER: &str = "small_cover.jpg";
/// Embedded code archive.
pub const CODE_ARCHIVE: &str = "code.zip";
/// Directory the code archive unpacks into.
pub const CODE_DIR: &str = "code";

/// Where a swap parks the install it replaces, inside its scratch directory.
const PARKED_DIR: &str = "previous";

const PAYLOAD_FILES: [&str; 4] = [DESCRIPTOR_FILE, BIG_COVER, SMALL_COVER, CODE_ARCHIVE];

/// Removes staging leftovers from an interrupted run.
///
/// An install parked by a swap that never completed is moved back to its
/// canonical directory first, provided that directory is missing.
///
/// # Errors
///
/// Returns [`IngestError::Filesystem`] when the directory exists but cannot
/// be read or removed.
pub fn purge_staging(plugin_root: &Path) -> Result<(), IngestError> {
    let staging = plugin_root.join(STAGING_DIR);
    let scratches = match fs::read_dir(&staging) {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(IngestError::filesystem("read", &staging, error)),
    };
    for scratch in scratches.flatten() {
        recover_parked(plugin_root, &scratch.path());
    }
    fs::remove_dir_all(&staging).map_err(|error| IngestError::filesystem("remove", &staging, error))
}

fn recover_parked(plugin_root: &Path, scratch: &Path) {
    let parked = scratch.join(PARKED_DIR);
    if !parked.is_dir() {
        return;
    }
    // Scratch directories are named `<uuid>-<random>`.
    let Some(uuid) = scratch
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rsplit_once('-'))
        .map(|(uuid, _)| uuid)
        .filter(|uuid| validate_uuid(uuid).is_ok())
    else {
        warn!(
            target: INGEST_TARGET,
            path = %scratch.display(),
            "parked install has no recognisable uuid; discarding"
        );
        return;
    };
    let canonical = plugin_root.join(uuid);
    if canonical.exists() {
        return;
    }
    match fs::rename(&parked, &canonical) {
        Ok(()) => info!(
            target: INGEST_TARGET,
            uuid,
            "restored install parked by an interrupted swap"
        ),
        Err(error) => warn!(
            target: INGEST_TARGET,
            uuid,
            %error,
            "failed to restore parked install"
        ),
    }
}

/// An install assembled off to the side of its canonical location.
#[derive(Debug)]
pub(crate) struct StagedInstall {
    scratch: TempDir,
    dir: PathBuf,
}

impl StagedInstall {
    /// Moves the payload files into a fresh staging directory and unpacks
    /// the code archive.
    pub(crate) fn assemble(
        payload_root: &Path,
        plugin_root: &Path,
        uuid: &str,
        limits: ExtractionLimits,
    ) -> Result<Self, IngestError> {
        let staging = plugin_root.join(STAGING_DIR);
        fs::create_dir_all(&staging)
            .map_err(|error| IngestError::filesystem("create", &staging, error))?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{uuid}-"))
            .tempdir_in(&staging)
            .map_err(|error| IngestError::filesystem("create", &staging, error))?;
        let dir = scratch.path().join("install");
        fs::create_dir(&dir).map_err(|error| IngestError::filesystem("create", &dir, error))?;

        for name in PAYLOAD_FILES {
            let source = payload_root.join(name);
            if !source.is_file() {
                return Err(IngestError::validation(format!(
                    "archive is missing {name}"
                )));
            }
            move_file(&source, &dir.join(name))?;
        }

        unpack_code(
            &dir.join(CODE_ARCHIVE),
            &dir.join(CODE_DIR),
            &scratch.path().join("unpack"),
            limits,
        )?;
        debug!(target: INGEST_TARGET, uuid, staged = %dir.display(), "install staged");
        Ok(Self { scratch, dir })
    }

    /// Checks that all five canonical entries are present and non-empty.
    pub(crate) fn verify(&self) -> Result<(), IngestError> {
        for name in PAYLOAD_FILES {
            let path = self.dir.join(name);
            let populated = fs::metadata(&path)
                .map(|meta| meta.is_file() && meta.len() > 0)
                .unwrap_or(false);
            if !populated {
                return Err(IngestError::validation(format!("{name} is missing or empty")));
            }
        }
        let code = self.dir.join(CODE_DIR);
        let code_populated = fs::read_dir(&code)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if !code_populated {
            return Err(IngestError::validation(format!(
                "{CODE_ARCHIVE} unpacked to an empty {CODE_DIR} directory"
            )));
        }
        Ok(())
    }

    /// Replaces `canonical` with the staged install.
    ///
    /// Any existing install is parked in the scratch directory. If the
    /// second rename fails the parked install is put back before returning.
    pub(crate) fn swap_into(self, canonical: &Path) -> Result<SwappedInstall, IngestError> {
        let mut backup = None;
        if canonical.exists() {
            let parked = self.scratch.path().join(PARKED_DIR);
            fs::rename(canonical, &parked)
                .map_err(|error| IngestError::filesystem("park", canonical, error))?;
            backup = Some(parked);
        }
        if let Err(error) = fs::rename(&self.dir, canonical) {
            if let Some(parked) = &backup {
                restore(parked, canonical);
            }
            return Err(IngestError::filesystem("install", canonical, error));
        }
        Ok(SwappedInstall {
            canonical: canonical.to_path_buf(),
            backup,
            scratch: self.scratch,
        })
    }
}

/// An install that has replaced its canonical directory but is not yet
/// committed.
#[derive(Debug)]
pub(crate) struct SwappedInstall {
    canonical: PathBuf,
    backup: Option<PathBuf>,
    scratch: TempDir,
}

impl SwappedInstall {
    /// Canonical directory now holding the new install.
    #[must_use]
    pub(crate) fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Discards the previous install.
    pub(crate) fn finish(self) {
        drop(self.scratch);
    }

    /// Removes the new install and restores the previous one, if any.
    pub(crate) fn rollback(self) {
        if let Err(error) = fs::remove_dir_all(&self.canonical) {
            warn!(
                target: INGEST_TARGET,
                path = %self.canonical.display(),
                %error,
                "failed to remove install during rollback"
            );
        }
        if let Some(parked) = &self.backup {
            restore(parked, &self.canonical);
        }
    }
}

fn restore(parked: &Path, canonical: &Path) {
    if let Err(error) = fs::rename(parked, canonical) {
        warn!(
            target: INGEST_TARGET,
            path = %canonical.display(),
            %error,
            "failed to restore previous install"
        );
    }
}

/// Unpacks `code_zip` so its content ends up at `target`.
///
/// A single top-level directory in the archive becomes `target` itself;
/// otherwise the whole unpack directory does.
fn unpack_code(
    code_zip: &Path,
    target: &Path,
    unpack: &Path,
    limits: ExtractionLimits,
) -> Result<(), IngestError> {
    fs::create_dir(unpack).map_err(|error| IngestError::filesystem("create", unpack, error))?;
    extract_zip(code_zip, unpack, limits)?;
    let entries = meaningful_entries(unpack)?;
    let source = match entries.as_slice() {
        [only] if only.is_dir() => only.clone(),
        _ => unpack.to_path_buf(),
    };
    fs::rename(&source, target).map_err(|error| IngestError::filesystem("rename", &source, error))
}
