//! Bounded zip extraction and payload layout helpers.
//!
//! Uploaded archives are untrusted. Every entry name is checked with
//! [`zip::read::ZipFile::enclosed_name`] so nothing lands outside the
//! destination, and both the entry count and the number of bytes actually
//! written are capped.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::INGEST_TARGET;
use crate::descriptor::DESCRIPTOR_FILE;
use crate::error::IngestError;

/// Default ceiling on archive entries.
pub const DEFAULT_MAX_ENTRIES: usize = 4096;
/// Default ceiling on total uncompressed bytes.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 256 * 1024 * 1024;

/// Resource ceilings applied to one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    /// Largest number of entries accepted.
    pub max_entries: usize,
    /// Largest number of uncompressed bytes written.
    pub max_total_bytes: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Counts gathered while extracting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written.
    pub files: usize,
    /// Uncompressed bytes written.
    pub bytes: u64,
}

/// Extracts `archive` into the existing directory `dest`.
///
/// # Errors
///
/// Returns [`IngestError::Extraction`] when the archive is corrupt, an entry
/// escapes `dest`, a limit is exceeded, or writing fails.
pub fn extract_zip(
    archive: &Path,
    dest: &Path,
    limits: ExtractionLimits,
) -> Result<ExtractSummary, IngestError> {
    let file = File::open(archive).map_err(|error| IngestError::extraction_io(archive, error))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|error| IngestError::extraction(archive, format!("not a zip archive: {error}")))?;

    if zip.len() > limits.max_entries {
        return Err(IngestError::extraction(
            archive,
            format!(
                "archive holds {} entries, limit is {}",
                zip.len(),
                limits.max_entries
            ),
        ));
    }

    let mut summary = ExtractSummary::default();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| IngestError::extraction(archive, format!("entry {index}: {error}")))?;
        let relative = entry
            .enclosed_name()
            .map(|name| name.to_path_buf())
            .ok_or_else(|| {
                IngestError::extraction(
                    archive,
                    format!("entry '{}' escapes the destination", entry.name()),
                )
            })?;
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|error| IngestError::extraction_io(archive, error))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| IngestError::extraction_io(archive, error))?;
        }
        let remaining = limits.max_total_bytes.saturating_sub(summary.bytes);
        let mut out =
            File::create(&target).map_err(|error| IngestError::extraction_io(archive, error))?;
        // Read one byte past the budget so an understated header is caught.
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
            .map_err(|error| IngestError::extraction_io(archive, error))?;
        if written > remaining {
            return Err(IngestError::extraction(
                archive,
                format!(
                    "archive expands beyond {} bytes",
                    limits.max_total_bytes
                ),
            ));
        }
        summary.bytes = summary.bytes.saturating_add(written);
        summary.files = summary.files.saturating_add(1);
    }

    debug!(
        target: INGEST_TARGET,
        archive = %archive.display(),
        files = summary.files,
        bytes = summary.bytes,
        "archive extracted"
    );
    Ok(summary)
}

/// Finds the directory holding `plugin.info` inside an extracted upload.
///
/// The payload may sit at the root or inside a single wrapper directory, as
/// produced when a folder is zipped. `__MACOSX` metadata folders are
/// ignored.
///
/// # Errors
///
/// Returns [`IngestError::Validation`] when no descriptor is found and
/// [`IngestError::Filesystem`] when the directory cannot be listed.
pub fn locate_payload_root(extracted: &Path) -> Result<PathBuf, IngestError> {
    if extracted.join(DESCRIPTOR_FILE).is_file() {
        return Ok(extracted.to_path_buf());
    }
    let entries = meaningful_entries(extracted)?;
    if let [only] = entries.as_slice() {
        if only.is_dir() && only.join(DESCRIPTOR_FILE).is_file() {
            return Ok(only.clone());
        }
    }
    Err(IngestError::validation(format!(
        "archive does not contain {DESCRIPTOR_FILE}"
    )))
}

/// Lists the top-level entries of `dir`, skipping `__MACOSX`.
pub(crate) fn meaningful_entries(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let read = fs::read_dir(dir).map_err(|error| IngestError::filesystem("list", dir, error))?;
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|error| IngestError::filesystem("list", dir, error))?;
        if entry.file_name() == "__MACOSX" {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Moves a file, falling back to copy-and-delete across filesystems.
///
/// # Errors
///
/// Returns [`IngestError::Filesystem`] when both the rename and the copy
/// fail.
pub fn move_file(from: &Path, to: &Path) -> Result<(), IngestError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|error| IngestError::filesystem("copy", from, error))?;
    fs::remove_file(from).map_err(|error| IngestError::filesystem("remove", from, error))
}
