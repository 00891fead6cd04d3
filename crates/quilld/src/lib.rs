//! The quill daemon.
//!
//! `quilld` serves a personal site and hosts uploaded plugins. Startup loads
//! layered configuration, installs structured telemetry, prepares the
//! storage directories and starts the background ingestion worker. Every
//! HTTP request then passes through one [`dispatch::Dispatcher`], which
//! resolves it to an exact route, a published static file, the nearest
//! subtree route, a WebSocket route, or a fixed 404.
//!
//! Plugin uploads arrive on `/personal/plugin`. The controller spools the
//! archive, runs it through [`quill_plugins::IngestionPipeline`] on the
//! worker, and publishes the installed files under `/plugin/<uuid>` once the
//! registry row is committed. Health hooks emit structured events at each
//! lifecycle step so operators can trace startup and installs.

mod bootstrap;
pub mod controllers;
pub mod dispatch;
mod health;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
