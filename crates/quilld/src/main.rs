//! Entry point for the quill daemon.

use std::process::ExitCode;
use std::sync::Arc;

use quill_plugins::{LoggingSupervisor, MemoryPluginStore};
use quilld::{StructuredHealthReporter, SystemConfigLoader, bootstrap_with};

fn main() -> ExitCode {
    let daemon = match bootstrap_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(MemoryPluginStore::new()),
        Arc::new(LoggingSupervisor),
    ) {
        Ok(daemon) => daemon,
        // The reporter has already logged the failure.
        Err(_) => return ExitCode::FAILURE,
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(daemon.serve()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}
