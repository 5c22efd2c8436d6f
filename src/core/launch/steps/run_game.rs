use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::command::GameCommand;
use crate::core::launch::steps::{forward_event, supervise_process};
use crate::core::launch::{LaunchStep, StepAbort, StepContext};
use crate::core::log::level::LogLevel;
use crate::core::process::{LoggedProcess, ProcessControl, ProcessState};

/// Spawns the game itself and supervises it to exit.
///
/// The spawned stub idles until it receives the plaintext `launch` token on
/// stdin; this step parks the launch in the Waiting state until the
/// controller's `proceed()` releases it, then writes the token. An abort
/// while waiting writes `abort` instead and kills the process.
pub struct RunGame {
    command: GameCommand,
    control: Arc<Mutex<Option<ProcessControl>>>,
}

impl RunGame {
    pub fn new(command: GameCommand) -> Self {
        Self {
            command,
            control: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl LaunchStep for RunGame {
    fn name(&self) -> &str {
        "Launch game"
    }

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
        ctx.emit_log(
            &format!("Launching with command:\n{}", self.command.describe()),
            LogLevel::Launcher,
        );

        let mut process = LoggedProcess::spawn(self.command.to_command());
        *self.control.lock().unwrap() = Some(process.control());
        let mut events = process.take_events();

        if process.state() == ProcessState::FailedToStart {
            while let Ok(event) = events.try_recv() {
                forward_event(event, ctx);
            }
            return Err(LauncherError::ProcessSpawn(
                self.command.java_binary.to_string_lossy().into_owned(),
            ));
        }

        // pause at the launch gate, keeping early output flowing
        {
            let ready = ctx.ready_for_launch();
            tokio::pin!(ready);
            loop {
                tokio::select! {
                    result = &mut ready => {
                        match result {
                            Ok(()) => {
                                process.write_line("launch").await?;
                                break;
                            }
                            Err(e) => {
                                let _ = process.write_line("abort").await;
                                process.control().kill();
                                supervise_process(&mut process, &mut events, ctx).await;
                                return Err(e);
                            }
                        }
                    }
                    event = events.recv() => {
                        if let Some(event) = event {
                            forward_event(event, ctx);
                        }
                    }
                }
            }
        }

        match supervise_process(&mut process, &mut events, ctx).await {
            ProcessState::Finished => Ok(()),
            ProcessState::Aborted => Err(LauncherError::Aborted),
            ProcessState::FailedToStart => Err(LauncherError::ProcessSpawn(
                self.command.java_binary.to_string_lossy().into_owned(),
            )),
            _ => Err(LauncherError::ProcessExit(process.exit_code().unwrap_or(-1))),
        }
    }

    fn abort_handle(&self) -> StepAbort {
        let slot = self.control.clone();
        StepAbort::with(move || {
            if let Some(control) = &*slot.lock().unwrap() {
                control.kill();
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::core::config::LauncherConfig;
    use crate::core::launch::{LaunchState, LaunchTask};
    use crate::core::task::{run, TaskState};
    use std::collections::HashMap;

    /// A stand-in for the launch stub: waits for the stdin token, echoes
    /// it, and exits cleanly.
    fn stub_command() -> GameCommand {
        GameCommand {
            java_binary: "sh".into(),
            jvm_args: vec!["-c".into(), "read token; echo \"token=$token\"".into()],
            classpath: Vec::new(),
            main_class: "stub".into(),
            game_args: Vec::new(),
            working_dir: std::env::temp_dir(),
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn waits_for_proceed_then_writes_the_launch_token() {
        let mut task = LaunchTask::new("launch", &LauncherConfig::default());
        task.append_step(Box::new(RunGame::new(stub_command()))).unwrap();
        let controller = task.controller();
        let mut watch = controller.state_watch();

        let runner = tokio::spawn(async move { run(&mut task).await });
        while *watch.borrow() != LaunchState::Waiting {
            watch.changed().await.unwrap();
        }
        controller.proceed();

        assert_eq!(runner.await.unwrap(), TaskState::Succeeded);
        assert_eq!(controller.state(), LaunchState::Finished);
        assert!(controller.log_text().contains("token=launch"));
    }

    #[tokio::test]
    async fn abort_while_waiting_kills_and_aborts() {
        let mut task = LaunchTask::new("launch", &LauncherConfig::default());
        task.append_step(Box::new(RunGame::new(stub_command()))).unwrap();
        let controller = task.controller();
        let mut watch = controller.state_watch();

        let runner = tokio::spawn(async move { run(&mut task).await });
        while *watch.borrow() != LaunchState::Waiting {
            watch.changed().await.unwrap();
        }
        assert!(controller.abort());

        assert_eq!(runner.await.unwrap(), TaskState::Aborted);
        assert_eq!(controller.state(), LaunchState::Aborted);
    }

    #[tokio::test]
    async fn missing_binary_fails_the_launch() {
        let mut command = stub_command();
        command.java_binary = "/definitely/not/java".into();
        let mut task = LaunchTask::new("launch", &LauncherConfig::default());
        task.append_step(Box::new(RunGame::new(command))).unwrap();
        let controller = task.controller();

        assert_eq!(run(&mut task).await, TaskState::Failed);
        assert_eq!(controller.state(), LaunchState::Failed);
        assert!(controller.log_text().contains("The process failed to start."));
    }
}
