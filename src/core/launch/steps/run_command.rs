use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::steps::supervise_process;
use crate::core::launch::substitution::expand_variables;
use crate::core::launch::{LaunchStep, StepAbort, StepContext};
use crate::core::log::level::LogLevel;
use crate::core::process::{LoggedProcess, ProcessControl, ProcessState};

/// Runs an operator-supplied hook command (pre- or post-launch), with
/// variable substitution applied to the command line. A non-zero exit
/// fails the step.
pub struct RunCommand {
    name: String,
    command_line: String,
    variables: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    control: Arc<Mutex<Option<ProcessControl>>>,
}

impl RunCommand {
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
            variables: HashMap::new(),
            working_dir: None,
            control: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl LaunchStep for RunCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
        let expanded = expand_variables(&self.command_line, &self.variables);
        let mut parts = expanded.split_whitespace();
        let Some(program) = parts.next() else {
            // no command configured: nothing to do
            return Ok(());
        };

        ctx.emit_log(&format!("Running command: {expanded}"), LogLevel::Launcher);
        let mut command = Command::new(program);
        command.args(parts);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut process = LoggedProcess::spawn(command);
        *self.control.lock().unwrap() = Some(process.control());
        let mut events = process.take_events();

        match supervise_process(&mut process, &mut events, ctx).await {
            ProcessState::Finished => Ok(()),
            ProcessState::Aborted => Err(LauncherError::Aborted),
            ProcessState::FailedToStart => Err(LauncherError::ProcessSpawn(expanded)),
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
    use crate::core::launch::LaunchTask;
    use crate::core::task::{run, TaskState};

    fn launch_with(step: RunCommand) -> LaunchTask {
        let mut task = LaunchTask::new("launch", &LauncherConfig::default());
        task.append_step(Box::new(step)).unwrap();
        task
    }

    #[tokio::test]
    async fn successful_command_passes_and_logs_output() {
        let mut task = launch_with(
            RunCommand::new("Pre-launch command", "echo hello-from-hook"),
        );
        let controller = task.controller();
        assert_eq!(run(&mut task).await, TaskState::Succeeded);
        assert!(controller.log_text().contains("hello-from-hook"));
    }

    #[tokio::test]
    async fn failing_command_fails_the_step() {
        let mut task = launch_with(RunCommand::new("Pre-launch command", "false"));
        assert_eq!(run(&mut task).await, TaskState::Failed);
    }

    #[tokio::test]
    async fn variables_expand_before_execution() {
        let variables = HashMap::from([("INST_NAME".to_string(), "testinst".to_string())]);
        let mut task = launch_with(
            RunCommand::new("Pre-launch command", "echo instance=$INST_NAME")
                .with_variables(variables),
        );
        let controller = task.controller();
        assert_eq!(run(&mut task).await, TaskState::Succeeded);
        assert!(controller.log_text().contains("instance=testinst"));
    }

    #[tokio::test]
    async fn empty_command_is_a_no_op() {
        let mut task = launch_with(RunCommand::new("Pre-launch command", "   "));
        assert_eq!(run(&mut task).await, TaskState::Succeeded);
    }
}
