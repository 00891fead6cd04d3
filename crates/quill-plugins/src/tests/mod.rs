//! Crate-level integration and BDD tests.

use std::sync::Arc;
use std::sync::mpsc;

use tempfile::TempDir;

use crate::pipeline::{IngestionPipeline, PipelineSettings};
use crate::store::{MemoryPluginStore, PluginStore};
use crate::supervisor::{ChannelSupervisor, LifecycleSignal};
use crate::test_support::PluginArchiveBuilder;
use crate::worker::IngestionWorker;
use crate::{ExtractionLimits, PluginType};


#[test]
fn worker_installs_and_signals_supervisor_end_to_end() {
    let dir = TempDir::new().expect("temp dir");
    let settings = PipelineSettings {
        plugin_root: dir.path().join("plugin"),
        raw_root: dir.path().join("raw"),
        tmp_root: dir.path().join("tmp"),
        limits: ExtractionLimits::default(),
    };
    for path in [&settings.plugin_root, &settings.raw_root, &settings.tmp_root] {
        std::fs::create_dir_all(path).expect("storage dir");
    }
    let store = Arc::new(MemoryPluginStore::new());
    let (signals, received) = mpsc::channel();
    let pipeline = IngestionPipeline::new(
        settings,
        store.clone(),
        Arc::new(ChannelSupervisor::new(signals)),
    )
    .expect("pipeline");
    let worker = IngestionWorker::spawn(Arc::new(pipeline), 2).expect("worker");

    let html = PluginArchiveBuilder::new("board")
        .language("html")
        .write_to(dir.path(), "board.zip")
        .expect("upload");
    let first = worker.submit(html.clone()).wait().expect("first ingest");
    let second = worker.submit(html).wait().expect("second ingest");
    worker.shutdown();

    assert_eq!(first.record.id, second.record.id);
    assert_eq!(second.record.plugin_type, PluginType::WebBundle);
    assert_eq!(store.list().expect("list").len(), 1);
    assert_eq!(
        received.try_iter().collect::<Vec<_>>(),
        vec![LifecycleSignal::Stop {
            id: first.record.id,
            uuid: String::from("board"),
        }]
    );
}
