pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::LauncherConfig;
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::launch::{
    GameCommand, LaunchController, LaunchSpec, LaunchState, LaunchStep, LaunchTask, StepContext,
};
pub use crate::core::log::{LogLevel, LogLine, LogModel};
pub use crate::core::net::{Checksum, Download, MetaCache, NetJob};
pub use crate::core::process::{LoggedProcess, ProcessState};
pub use crate::core::task::{
    run, ConcurrentTask, MultipleOptionsTask, SequentialTask, Task, TaskHandle, TaskState,
};
pub use crate::core::version::{Library, VersionProfile};

/// Initialize structured logging for embedding binaries.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ignition=debug")),
        )
        .init();

    tracing::info!("Ignition core starting...");
}
