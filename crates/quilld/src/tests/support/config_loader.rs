//! Configuration loaders for tests covering success and failure paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use quill_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that roots all storage under a temporary directory.
pub struct TestConfigLoader {
    dir: Arc<TempDir>,
    assets: Option<PathBuf>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary storage root");
        Self {
            dir: Arc::new(dir),
            assets: None,
        }
    }

    /// Publishes `assets` under the default prefix at startup.
    #[must_use]
    pub fn with_assets(mut self, assets: &Path) -> Self {
        self.assets = Some(assets.to_path_buf());
        self
    }

    /// Temporary directory every storage root lives in.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Configuration this loader yields.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            listen_addr: Some(String::from("127.0.0.1:0")),
            storage_root: Some(utf8(self.dir.path().join("storage"))),
            assets_dir: self.assets.clone().map(utf8),
            ..Config::default()
        }
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config())
    }
}

fn utf8(path: PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).expect("temporary path was not valid UTF-8")
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("quilld"),
            OsString::from("--ingest-workers"),
            OsString::from("many"),
        ];
        Config::load_from_iter(args)
    }
}
