//! Daemon bootstrap orchestration.
//!
//! Configuration is loaded, telemetry installed, storage directories
//! prepared, and the ingestion worker started before any route is
//! registered. Installed plugins and the optional site asset directory are
//! published into the static index, then the handler tables are frozen.

use std::io;
use std::path::Path;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tokio::net::TcpListener;

use quill_config::{Config, StorageLayout, StorageLayoutError};
use quill_plugins::{
    ExtractionLimits, IngestError, IngestionPipeline, IngestionWorker, PipelineSettings,
    PluginStore, Supervisor,
};

use crate::controllers::{
    HEALTH_ROUTE, PLUGIN_PUBLIC_PREFIX, PLUGIN_ROUTE, PluginController, UploadSettings, healthz,
};
use crate::dispatch::{Dispatcher, DispatcherBuilder, Handler, StaticIndex, WalkLimits};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{self, TransportState};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A storage directory could not be created.
    #[error("failed to prepare storage: {source}")]
    Storage {
        /// Directory failure.
        #[source]
        source: StorageLayoutError,
    },
    /// The ingestion pipeline could not be prepared.
    #[error("failed to prepare plugin ingestion: {source}")]
    Ingestion {
        /// Pipeline construction failure.
        #[source]
        source: IngestError,
    },
    /// Ingestion threads could not be spawned.
    #[error("failed to start ingestion worker: {source}")]
    Worker {
        /// Thread spawn failure.
        #[source]
        source: io::Error,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    pipeline: Arc<IngestionPipeline>,
    telemetry: TelemetryHandle,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Frozen dispatcher serving every request.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Pipeline behind the upload route.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns the bind or accept-loop I/O error.
    pub async fn serve(self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let state = TransportState::new(self.dispatcher, self.config.max_upload_bytes());
        transport::serve(listener, state).await
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns the first [`BootstrapError`]; the reporter sees it as well.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    store: Arc<dyn PluginStore>,
    supervisor: Arc<dyn Supervisor>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, &reporter, store, supervisor) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    store: Arc<dyn PluginStore>,
    supervisor: Arc<dyn Supervisor>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let layout =
        StorageLayout::from_config(&config).map_err(|source| BootstrapError::Storage { source })?;

    let settings = PipelineSettings {
        plugin_root: layout.plugin_root().as_std_path().to_path_buf(),
        raw_root: layout.raw_root().as_std_path().to_path_buf(),
        tmp_root: layout.tmp_root().as_std_path().to_path_buf(),
        limits: ExtractionLimits {
            max_entries: config.max_archive_entries(),
            max_total_bytes: config.max_extracted_bytes(),
        },
    };
    let pipeline = Arc::new(
        IngestionPipeline::new(settings, store, supervisor)
            .map_err(|source| BootstrapError::Ingestion { source })?,
    );
    let worker = IngestionWorker::spawn(Arc::clone(&pipeline), config.ingest_workers())
        .map_err(|source| BootstrapError::Worker { source })?;

    let statics = Arc::new(StaticIndex::new(WalkLimits {
        max_depth: config.max_walk_depth(),
        max_entries: config.max_walk_entries(),
    }));
    republish_plugins(&pipeline, &statics, reporter.as_ref());
    if let Some(assets) = config.assets_dir() {
        publish(&statics, reporter.as_ref(), config.assets_prefix(), assets.as_std_path());
    }

    let controller = PluginController::new(
        Arc::new(worker),
        pipeline.raw_archives().clone(),
        Arc::clone(&statics),
        Arc::clone(reporter),
        UploadSettings {
            tmp_root: layout.tmp_root().as_std_path().to_path_buf(),
            max_upload_bytes: config.max_upload_bytes(),
        },
    );
    let mut builder = DispatcherBuilder::new(statics);
    let routes: [(&str, Arc<dyn Handler>); 2] = [
        (PLUGIN_ROUTE, Arc::new(controller)),
        (HEALTH_ROUTE, Arc::new(healthz)),
    ];
    for (pattern, handler) in routes {
        if let Err(error) = builder.register_exact(pattern, handler) {
            reporter.route_rejected(&error);
        }
    }

    Ok(Daemon {
        config,
        dispatcher: Arc::new(builder.build()),
        pipeline,
        telemetry,
    })
}

fn republish_plugins(
    pipeline: &IngestionPipeline,
    statics: &StaticIndex,
    reporter: &dyn HealthReporter,
) {
    let records = match pipeline.store().list() {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(
                target: crate::health::HEALTH_TARGET,
                %error,
                "cannot list installed plugins; skipping republish"
            );
            return;
        }
    };
    for record in records {
        let dir = pipeline.install_dir(&record.uuid);
        if dir.is_dir() {
            let prefix = format!("{PLUGIN_PUBLIC_PREFIX}/{}", record.uuid);
            publish(statics, reporter, &prefix, &dir);
        }
    }
}

fn publish(statics: &StaticIndex, reporter: &dyn HealthReporter, prefix: &str, dir: &Path) {
    match statics.publish_tree(prefix, dir) {
        Ok(report) => reporter.static_tree_published(prefix, &report),
        Err(error) => reporter.static_tree_failed(prefix, &error),
    }
}
