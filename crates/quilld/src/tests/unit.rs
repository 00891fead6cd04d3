//! Unit tests for the daemon bootstrap.

use std::fs;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use rstest::rstest;
use tempfile::TempDir;

use quill_plugins::test_support::PluginArchiveBuilder;
use quill_plugins::{LoggingSupervisor, MemoryPluginStore};

use crate::bootstrap::{StaticConfigLoader, bootstrap_with};
use crate::controllers::{HEALTH_ROUTE, PLUGIN_ROUTE};
use crate::dispatch::{Request, Resolution};

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader, TestDaemon,
};

#[rstest]
fn bootstrap_reports_start_and_success() {
    let harness = TestDaemon::start();

    let events = harness.reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert_eq!(events.last(), Some(&HealthEvent::BootstrapSucceeded));
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, HealthEvent::RouteRejected(_)))
    );
}

#[rstest]
fn bootstrap_creates_the_storage_layout() {
    let harness = TestDaemon::start();
    let storage = harness.loader.root().join("storage");

    for dir in ["plugin", "raw", "tmp"] {
        assert!(storage.join(dir).is_dir(), "missing {dir}");
    }
}

#[rstest]
fn bootstrap_registers_the_builtin_routes() {
    let harness = TestDaemon::start();
    let dispatcher = harness.daemon.dispatcher();

    assert!(matches!(dispatcher.resolve(PLUGIN_ROUTE, false), Resolution::Exact(_)));
    assert!(matches!(dispatcher.resolve(HEALTH_ROUTE, false), Resolution::Exact(_)));
    assert_eq!(harness.get(HEALTH_ROUTE).status(), StatusCode::OK);
}

#[rstest]
fn configuration_failures_are_reported() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let result = bootstrap_with(
        &FailingConfigLoader,
        reporter.clone(),
        Arc::new(MemoryPluginStore::new()),
        Arc::new(LoggingSupervisor),
    );

    assert!(result.is_err(), "bootstrap succeeded unexpectedly");
    assert!(
        reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)))
    );
}

#[rstest]
fn unusable_storage_root_fails_bootstrap() {
    let loader = TestConfigLoader::new();
    let blocker = loader.root().join("storage");
    fs::write(&blocker, "not a directory").expect("blocker file");
    let reporter = Arc::new(RecordingHealthReporter::default());

    let result = bootstrap_with(
        &loader,
        reporter.clone(),
        Arc::new(MemoryPluginStore::new()),
        Arc::new(LoggingSupervisor),
    );

    let error = result.err().expect("storage should fail");
    assert!(error.to_string().contains("storage"), "{error}");
}

#[rstest]
fn site_assets_are_published_under_their_prefix() {
    let assets = TempDir::new().expect("assets dir");
    fs::write(assets.path().join("robots.txt"), "User-agent: *").expect("robots");
    let harness = TestDaemon::start_with(TestConfigLoader::new().with_assets(assets.path()));

    assert_eq!(harness.get("/static/robots.txt").status(), StatusCode::OK);
    assert!(harness.reporter.events().contains(&HealthEvent::StaticTreePublished {
        prefix: String::from("/static"),
        added: 1,
    }));
}

#[rstest]
fn missing_assets_dir_is_not_fatal() {
    let loader = TestConfigLoader::new();
    let missing = loader.root().join("no-such-assets");
    let harness = TestDaemon::start_with(loader.with_assets(&missing));

    assert!(
        harness
            .reporter
            .events()
            .contains(&HealthEvent::StaticTreeFailed(String::from("/static")))
    );
}

#[rstest]
fn installed_plugins_are_republished_after_restart() {
    let store = Arc::new(MemoryPluginStore::new());
    let loader = TestConfigLoader::new();
    let config = loader.config();

    let first = bootstrap_with(
        &StaticConfigLoader::new(config.clone()),
        Arc::new(RecordingHealthReporter::default()),
        store.clone(),
        Arc::new(LoggingSupervisor),
    )
    .expect("first boot");
    let archive = PluginArchiveBuilder::new("abc123").build().expect("archive");
    let upload = first
        .dispatcher()
        .serve(&super::support::upload_request("raw", &archive));
    assert_eq!(upload.status(), StatusCode::OK);
    drop(first);

    let reporter = Arc::new(RecordingHealthReporter::default());
    let second = bootstrap_with(
        &StaticConfigLoader::new(config),
        reporter.clone(),
        store,
        Arc::new(LoggingSupervisor),
    )
    .expect("second boot");

    let response = second
        .dispatcher()
        .serve(&Request::new(Method::GET, "/plugin/abc123/plugin.info"));
    assert_eq!(response.status(), StatusCode::OK);
    assert!(reporter.events().iter().any(|event| matches!(
        event,
        HealthEvent::StaticTreePublished { prefix, .. } if prefix == "/plugin/abc123"
    )));
}
