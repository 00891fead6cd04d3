//! Plugin ingestion for the quill daemon.
//!
//! A plugin is uploaded as a zip archive holding a `plugin.info` descriptor,
//! two cover images and a `code.zip` payload. This crate validates such an
//! archive, installs it into `<plugin_root>/<uuid>/`, keeps a private copy
//! in `<raw_root>/<uuid>.zip`, upserts the registry row through a
//! [`PluginStore`], and asks the external [`Supervisor`] to stop the previous
//! instance when a known plugin is replaced.
//!
//! # Architecture
//!
//! [`IngestionPipeline`] runs one ingestion synchronously. It stages the
//! install beside its canonical location, verifies it, swaps it into place,
//! and only then commits the registry row; a failed commit rolls the swap
//! back. Uploads of the same uuid are serialised by [`UuidLocks`].
//! [`IngestionWorker`] runs pipelines on dedicated threads and hands each
//! caller an [`IngestionTask`] that streams progress followed by exactly one
//! terminal result.

pub mod archive;
pub mod descriptor;
pub mod error;
pub mod install;
pub mod locks;
pub mod pipeline;
pub mod raw;
pub mod store;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod worker;

#[cfg(test)]
mod tests;

/// Tracing target for ingestion events.
pub(crate) const INGEST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::ingest");

pub use self::archive::ExtractionLimits;
pub use self::descriptor::{LaunchCommand, Language, PluginDescriptor, PluginType, ScriptRuntime};
pub use self::error::{IngestError, StoreError};
pub use self::install::{BIG_COVER, CODE_ARCHIVE, CODE_DIR, SMALL_COVER};
pub use self::locks::{UuidGuard, UuidLocks};
pub use self::pipeline::{
    CancelToken, IngestAction, IngestOutcome, IngestStage, IngestionPipeline, PipelineSettings,
    ProgressEvent, ProgressLevel, ProgressSink,
};
pub use self::raw::RawArchives;
pub use self::store::{MemoryPluginStore, PluginDraft, PluginId, PluginRecord, PluginStore};
pub use self::supervisor::{ChannelSupervisor, LifecycleSignal, LoggingSupervisor, Supervisor};
pub use self::worker::{IngestEvent, IngestionTask, IngestionWorker};
