//! Scenario world for the daemon behaviour suite.

use std::fs;

use tempfile::TempDir;

use quill_plugins::test_support::PluginArchiveBuilder;

use crate::dispatch::Response;

use super::{TestConfigLoader, TestDaemon};

/// State shared across the steps of one scenario.
#[derive(Default)]
pub struct DaemonWorld {
    daemon: Option<TestDaemon>,
    assets: Option<TempDir>,
    last_archive: Vec<u8>,
    response: Option<Response>,
}

impl DaemonWorld {
    /// Boots a daemon with no site assets.
    pub fn start(&mut self) {
        self.daemon = Some(TestDaemon::start());
    }

    /// Boots a daemon publishing a small asset tree.
    pub fn start_with_assets(&mut self) {
        let assets = TempDir::new().expect("assets dir");
        fs::create_dir_all(assets.path().join("css")).expect("css dir");
        fs::write(assets.path().join("css/site.css"), "body {}").expect("stylesheet");
        let loader = TestConfigLoader::new().with_assets(assets.path());
        self.daemon = Some(TestDaemon::start_with(loader));
        self.assets = Some(assets);
    }

    /// Running daemon.
    pub fn daemon(&self) -> &TestDaemon {
        self.daemon.as_ref().expect("daemon not started")
    }

    /// Uploads the archive `builder` produces and keeps the response.
    pub fn upload(&mut self, builder: &PluginArchiveBuilder) {
        let archive = builder.build().expect("archive");
        let response = self.daemon().upload(&archive);
        self.last_archive = archive;
        self.response = Some(response);
    }

    /// Issues a `GET` and keeps the response.
    pub fn get(&mut self, target: &str) {
        let response = self.daemon().get(target);
        self.response = Some(response);
    }

    /// Most recent response.
    pub fn response(&self) -> &Response {
        self.response.as_ref().expect("no request issued")
    }

    /// Bytes of the most recent upload.
    pub fn last_archive(&self) -> &[u8] {
        &self.last_archive
    }
}
