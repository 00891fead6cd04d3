//! Lifecycle notifications sent to the external plugin supervisor.
//!
//! The pipeline only signals; it never waits for a plugin to stop.

use std::sync::mpsc::Sender;

use tracing::{debug, info};

use crate::INGEST_TARGET;
use crate::store::PluginId;

/// Receives fire-and-forget lifecycle requests.
pub trait Supervisor: Send + Sync {
    /// Asks the supervisor to stop the running instance of a plugin.
    fn request_stop(&self, id: PluginId, uuid: &str);
}

/// Supervisor that only records requests in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSupervisor;

impl Supervisor for LoggingSupervisor {
    fn request_stop(&self, id: PluginId, uuid: &str) {
        info!(
            target: INGEST_TARGET,
            event = "plugin.stop_requested",
            plugin_id = id.get(),
            uuid,
            "stop requested for running plugin"
        );
    }
}

/// Signal delivered through a [`ChannelSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Stop the running instance.
    Stop {
        /// Internal plugin id.
        id: PluginId,
        /// External plugin uuid.
        uuid: String,
    },
}

/// Supervisor that forwards requests over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSupervisor {
    sender: Sender<LifecycleSignal>,
}

impl ChannelSupervisor {
    /// Wraps the sending half of a signal channel.
    #[must_use]
    pub const fn new(sender: Sender<LifecycleSignal>) -> Self {
        Self { sender }
    }
}

impl Supervisor for ChannelSupervisor {
    fn request_stop(&self, id: PluginId, uuid: &str) {
        let signal = LifecycleSignal::Stop {
            id,
            uuid: uuid.to_owned(),
        };
        if self.sender.send(signal).is_err() {
            debug!(
                target: INGEST_TARGET,
                uuid,
                "supervisor channel closed; stop request dropped"
            );
        }
    }
}
