//! Test double for [`HealthReporter`] that records events for assertions.

use std::sync::Mutex;

use quill_config::Config;
use quill_plugins::IngestOutcome;

use crate::bootstrap::BootstrapError;
use crate::dispatch::{DispatchError, PublishReport};
use crate::health::HealthReporter;

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A route registration was refused.
    RouteRejected(String),
    /// A static tree was published.
    StaticTreePublished { prefix: String, added: usize },
    /// A static tree was refused.
    StaticTreeFailed(String),
    /// A plugin upload was installed.
    PluginInstalled(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn route_rejected(&self, error: &DispatchError) {
        self.record(HealthEvent::RouteRejected(error.to_string()));
    }

    fn static_tree_published(&self, prefix: &str, report: &PublishReport) {
        self.record(HealthEvent::StaticTreePublished {
            prefix: prefix.to_owned(),
            added: report.added,
        });
    }

    fn static_tree_failed(&self, prefix: &str, _error: &DispatchError) {
        self.record(HealthEvent::StaticTreeFailed(prefix.to_owned()));
    }

    fn plugin_installed(&self, outcome: &IngestOutcome) {
        self.record(HealthEvent::PluginInstalled(outcome.record.uuid.clone()));
    }
}
