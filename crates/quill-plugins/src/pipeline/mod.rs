//! The plugin ingestion pipeline.
//!
//! One run takes an uploaded archive through
//! extract, validate, lock, lookup, stage, verify, stop-notify, swap, raw
//! copy and registry commit. A committed registry row always points at a
//! complete canonical directory: the directory swap happens before the
//! upsert, and a failed upsert rolls the swap back.
//!
//! Runs are blocking and belong on a dedicated thread; see
//! [`crate::IngestionWorker`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;
use tracing::{info, warn};

use crate::INGEST_TARGET;
use crate::archive::{ExtractionLimits, extract_zip, locate_payload_root};
use crate::descriptor::{DESCRIPTOR_FILE, PluginDescriptor};
use crate::error::IngestError;
use crate::install::{StagedInstall, purge_staging};
use crate::locks::UuidLocks;
use crate::raw::RawArchives;
use crate::store::{PluginDraft, PluginRecord, PluginStore};
use crate::supervisor::Supervisor;

/// Steps of an ingestion run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStage {
    /// Unpacking the upload.
    Extract,
    /// Parsing the descriptor.
    Validate,
    /// Claiming the uuid and reading the registry.
    Lookup,
    /// Assembling the install off to the side.
    Stage,
    /// Checking the staged install is complete.
    Verify,
    /// Asking the supervisor to stop the old instance.
    Notify,
    /// Replacing the canonical directory.
    Swap,
    /// Copying the upload to raw storage.
    Archive,
    /// Upserting the registry row.
    Commit,
}

impl IngestStage {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::Lookup => "lookup",
            Self::Stage => "stage",
            Self::Verify => "verify",
            Self::Notify => "notify",
            Self::Swap => "swap",
            Self::Archive => "archive",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    /// Normal progress.
    Info,
    /// Something the uploader should know about.
    Warning,
}

impl ProgressLevel {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

/// Human-readable progress emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Stage the message belongs to.
    pub stage: IngestStage,
    /// Severity.
    pub level: ProgressLevel,
    /// Message text.
    pub message: String,
}

/// Receives progress while a run is in flight.
pub trait ProgressSink {
    /// Records one event.
    fn report(&mut self, event: ProgressEvent);
}

impl ProgressSink for Vec<ProgressEvent> {
    fn report(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

/// Cooperative cancellation flag shared between a task and its run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Reports whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, stage: IngestStage) -> Result<(), IngestError> {
        if self.is_cancelled() {
            Err(IngestError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Whether a run created or replaced a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAction {
    /// First ingest of the uuid.
    Inserted,
    /// Re-ingest of a known uuid.
    Updated,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Registry row as committed.
    pub record: PluginRecord,
    /// Insert or update.
    pub action: IngestAction,
    /// Canonical directory now holding the plugin.
    pub install_dir: PathBuf,
}

/// Filesystem locations and limits used by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root of canonical plugin directories.
    pub plugin_root: PathBuf,
    /// Root of raw archive copies.
    pub raw_root: PathBuf,
    /// Scratch root for extracting uploads.
    pub tmp_root: PathBuf,
    /// Extraction ceilings.
    pub limits: ExtractionLimits,
}

/// Runs ingestions against a store and supervisor.
pub struct IngestionPipeline {
    settings: PipelineSettings,
    store: Arc<dyn PluginStore>,
    supervisor: Arc<dyn Supervisor>,
    raw: RawArchives,
    locks: UuidLocks,
}

impl fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    /// Creates a pipeline and clears staging leftovers from earlier runs.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Filesystem`] when stale staging data cannot be
    /// removed.
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn PluginStore>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Result<Self, IngestError> {
        purge_staging(&settings.plugin_root)?;
        let raw = RawArchives::new(settings.raw_root.clone());
        Ok(Self {
            settings,
            store,
            supervisor,
            raw,
            locks: UuidLocks::new(),
        })
    }

    /// Registry backing this pipeline.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    /// Raw archive storage.
    #[must_use]
    pub const fn raw_archives(&self) -> &RawArchives {
        &self.raw
    }

    /// Canonical directory for `uuid`.
    #[must_use]
    pub fn install_dir(&self, uuid: &str) -> PathBuf {
        self.settings.plugin_root.join(uuid)
    }

    /// Ingests the archive at `upload`.
    ///
    /// `upload` is copied into raw storage, never moved; the caller owns it.
    /// Cancellation is honoured up to the moment the directory swap begins.
    ///
    /// # Errors
    ///
    /// Returns the first [`IngestError`] hit. Failures before the swap leave
    /// the canonical directory and registry untouched; failures after it are
    /// rolled back.
    pub fn ingest(
        &self,
        upload: &Path,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<IngestOutcome, IngestError> {
        cancel.checkpoint(IngestStage::Extract)?;
        let scratch = self.unpack_upload(upload, sink)?;

        cancel.checkpoint(IngestStage::Validate)?;
        let payload_root = locate_payload_root(scratch.path())?;
        let descriptor = PluginDescriptor::from_path(&payload_root.join(DESCRIPTOR_FILE))?;
        let uuid = descriptor.uuid();
        emit(
            sink,
            IngestStage::Validate,
            format!(
                "descriptor accepted: {} {} ({})",
                descriptor.name(),
                descriptor.version(),
                descriptor.plugin_type()
            ),
        );

        cancel.checkpoint(IngestStage::Lookup)?;
        let _guard = match self.locks.try_acquire(uuid) {
            Some(guard) => guard,
            None => {
                warn_progress(
                    sink,
                    IngestStage::Lookup,
                    format!("waiting for another upload of {uuid} to finish"),
                );
                self.locks.acquire(uuid)
            }
        };
        let existing = self
            .store
            .fetch(uuid)
            .map_err(|error| IngestError::persistence(uuid, error))?;
        let action = match &existing {
            Some(record) => {
                emit(
                    sink,
                    IngestStage::Lookup,
                    format!("updating plugin {uuid} (id {})", record.id),
                );
                IngestAction::Updated
            }
            None => {
                emit(sink, IngestStage::Lookup, format!("installing new plugin {uuid}"));
                IngestAction::Inserted
            }
        };

        cancel.checkpoint(IngestStage::Stage)?;
        let staged = StagedInstall::assemble(
            &payload_root,
            &self.settings.plugin_root,
            uuid,
            self.settings.limits,
        )?;
        staged.verify()?;
        emit(sink, IngestStage::Verify, String::from("staged install verified"));

        // Last cancellation point: from here the run completes or rolls back.
        cancel.checkpoint(IngestStage::Swap)?;
        if let Some(record) = &existing {
            self.supervisor.request_stop(record.id, uuid);
            emit(
                sink,
                IngestStage::Notify,
                String::from("stop requested for running instance"),
            );
        }

        let canonical = self.install_dir(uuid);
        let swapped = staged.swap_into(&canonical)?;
        emit(
            sink,
            IngestStage::Swap,
            format!("installed into {}", swapped.canonical().display()),
        );

        let raw = match self.raw.replace(uuid, upload) {
            Ok(raw) => raw,
            Err(error) => {
                swapped.rollback();
                return Err(error);
            }
        };

        let draft = PluginDraft::from(&descriptor);
        let committed = match &existing {
            Some(record) => self.store.update(record.id, &draft),
            None => self.store.insert(&draft),
        };
        let record = match committed {
            Ok(record) => record,
            Err(error) => {
                raw.rollback();
                swapped.rollback();
                warn!(
                    target: INGEST_TARGET,
                    uuid,
                    %error,
                    "registry commit failed; install rolled back"
                );
                return Err(IngestError::persistence(uuid, error));
            }
        };
        raw.commit();
        swapped.finish();
        emit(
            sink,
            IngestStage::Commit,
            format!("registry row {} committed", record.id),
        );

        info!(
            target: INGEST_TARGET,
            event = "plugin.ingested",
            uuid,
            plugin_id = record.id.get(),
            version = %record.version,
            action = ?action,
            "plugin ingested"
        );
        Ok(IngestOutcome {
            record,
            action,
            install_dir: canonical,
        })
    }

    fn unpack_upload(
        &self,
        upload: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<TempDir, IngestError> {
        let tmp_root = &self.settings.tmp_root;
        let scratch = tempfile::Builder::new()
            .prefix("ingest-")
            .tempdir_in(tmp_root)
            .map_err(|error| IngestError::filesystem("create", tmp_root, error))?;
        let summary = extract_zip(upload, scratch.path(), self.settings.limits)?;
        emit(
            sink,
            IngestStage::Extract,
            format!(
                "archive extracted: {} files, {} bytes",
                summary.files, summary.bytes
            ),
        );
        Ok(scratch)
    }
}

fn emit(sink: &mut dyn ProgressSink, stage: IngestStage, message: String) {
    sink.report(ProgressEvent {
        stage,
        level: ProgressLevel::Info,
        message,
    });
}

fn warn_progress(sink: &mut dyn ProgressSink, stage: IngestStage, message: String) {
    sink.report(ProgressEvent {
        stage,
        level: ProgressLevel::Warning,
        message,
    });
}
