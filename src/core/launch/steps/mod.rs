// ─── Launch Steps ───
// The concrete units a LaunchTask is assembled from.

pub mod create_folders;
pub mod download_libraries;
pub mod extract_natives;
pub mod run_command;
pub mod run_game;
pub mod text_print;

pub use create_folders::CreateGameFolders;
pub use download_libraries::DownloadLibraries;
pub use extract_natives::ExtractNatives;
pub use run_command::RunCommand;
pub use run_game::RunGame;
pub use text_print::TextPrint;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::core::launch::StepContext;
use crate::core::process::{LoggedProcess, ProcessEvent, ProcessState};

/// Pump a supervised process to exit, forwarding its log events into the
/// launch's routing pipeline, then deliver whatever arrived after the exit
/// classification.
pub(crate) async fn supervise_process(
    process: &mut LoggedProcess,
    events: &mut UnboundedReceiver<ProcessEvent>,
    ctx: &StepContext,
) -> ProcessState {
    let mut wait = std::pin::pin!(process.wait());
    let state = loop {
        tokio::select! {
            state = &mut wait => break state,
            event = events.recv() => {
                if let Some(event) = event {
                    forward_event(event, ctx);
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        forward_event(event, ctx);
    }
    state
}

pub(crate) fn forward_event(event: ProcessEvent, ctx: &StepContext) {
    match event {
        ProcessEvent::Log { lines, level } => ctx.emit_lines(&lines, level),
        ProcessEvent::StateChanged(state) => debug!("Process state: {:?}", state),
    }
}
