//! Handlers registered by the daemon at startup.

mod health;
mod plugin;

pub use self::health::{HEALTH_ROUTE, healthz};
pub use self::plugin::{
    PLUGIN_PUBLIC_PREFIX, PLUGIN_ROUTE, PluginController, UPLOAD_FIELD, UploadSettings,
};

/// Tracing target for controllers.
pub(crate) const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controllers");

