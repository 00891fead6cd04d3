//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use quill_config::Config;
use quill_plugins::IngestOutcome;

use crate::bootstrap::BootstrapError;
use crate::dispatch::{DispatchError, PublishReport};

/// Tracing target for health events.
pub(crate) const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a route registration is rejected.
    fn route_rejected(&self, error: &DispatchError);

    /// Invoked after a static tree is published.
    fn static_tree_published(&self, prefix: &str, report: &PublishReport);

    /// Invoked when a static tree cannot be published.
    fn static_tree_failed(&self, prefix: &str, error: &DispatchError);

    /// Invoked after an upload is installed.
    fn plugin_installed(&self, outcome: &IngestOutcome);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn route_rejected(&self, error: &DispatchError) {
        (**self).route_rejected(error);
    }

    fn static_tree_published(&self, prefix: &str, report: &PublishReport) {
        (**self).static_tree_published(prefix, report);
    }

    fn static_tree_failed(&self, prefix: &str, error: &DispatchError) {
        (**self).static_tree_failed(prefix, error);
    }

    fn plugin_installed(&self, outcome: &IngestOutcome) {
        (**self).plugin_installed(outcome);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen_addr = config.listen_addr(),
            storage_root = %config.storage_root(),
            log_filter = config.log_filter(),
            log_format = ?config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn route_rejected(&self, error: &DispatchError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "route_rejected",
            error = %error,
            "route registration skipped"
        );
    }

    fn static_tree_published(&self, prefix: &str, report: &PublishReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "static_tree_published",
            prefix,
            added = report.added,
            skipped = report.skipped,
            "static tree published"
        );
    }

    fn static_tree_failed(&self, prefix: &str, error: &DispatchError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "static_tree_failed",
            prefix,
            error = %error,
            "static tree not published"
        );
    }

    fn plugin_installed(&self, outcome: &IngestOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_installed",
            id = %outcome.record.id,
            uuid = %outcome.record.uuid,
            version = %outcome.record.version,
            action = ?outcome.action,
            "plugin installed"
        );
    }
}
