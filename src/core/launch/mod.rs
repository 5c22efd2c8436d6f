// ─── Launch Orchestration ───
// Drives an ordered sequence of launch steps: folder creation, library
// download, natives extraction, hook commands, the game process itself.
// Routes every produced log line through level resolution and censoring
// into the bounded log model, and tears steps down in reverse order on
// every exit path.

pub mod command;
pub mod steps;
pub mod substitution;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tracing::debug;

use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::log::level::{guess_level, LogLevel};
use crate::core::log::model::LogModel;
use crate::core::task::{Task, TaskHandle, TaskState};

pub use command::GameCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    NotStarted,
    Running,
    /// Paused between steps, waiting for an external `proceed()`.
    Waiting,
    Finished,
    Failed,
    Aborted,
}

/// Cloneable cancellation interface of one step. Steps that can be
/// interrupted hand out a hook; the default is not abortable.
#[derive(Clone, Default)]
pub struct StepAbort {
    hook: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl StepAbort {
    pub fn not_abortable() -> Self {
        Self::default()
    }

    pub fn with(hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    pub fn can_abort(&self) -> bool {
        self.hook.is_some()
    }

    /// Ask the step to stop. Returns whether the request was accepted.
    pub fn abort(&self) -> bool {
        match &self.hook {
            Some(hook) => hook(),
            None => false,
        }
    }
}

/// One ordered unit of the launch pipeline.
#[async_trait]
pub trait LaunchStep: Send {
    fn name(&self) -> &str;

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()>;

    /// Cleanup hook, called in reverse start order on every exit path.
    async fn finalize(&mut self, _ctx: &StepContext) {}

    fn abort_handle(&self) -> StepAbort {
        StepAbort::not_abortable()
    }
}

struct LaunchShared {
    state: watch::Sender<LaunchState>,
    proceed_notify: Notify,
    log_model: Mutex<LogModel>,
    censor_filter: Mutex<HashMap<String, String>>,
}

impl LaunchShared {
    fn set_state(&self, next: LaunchState) {
        self.state.send_replace(next);
    }

    fn state(&self) -> LaunchState {
        *self.state.borrow()
    }
}

/// Handed to each step while it runs: log routing, progress reporting and
/// the ready-for-launch pause protocol.
pub struct StepContext {
    shared: Arc<LaunchShared>,
    task: TaskHandle,
}

impl StepContext {
    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    pub fn check_aborted(&self) -> LauncherResult<()> {
        self.task.check_aborted()
    }

    /// Route one produced line into the log model: an explicit `!![Level]!`
    /// marker wins, ambiguous levels go through the heuristic guesser, and
    /// private values are censored before storage.
    pub fn emit_log(&self, line: &str, default_level: LogLevel) {
        let (mut level, text) = match LogLevel::from_line(line) {
            Some((marker, rest)) => (marker, rest.to_string()),
            None => (default_level, line.to_string()),
        };

        if matches!(level, LogLevel::StdOut | LogLevel::StdErr | LogLevel::Unknown) {
            level = guess_level(&text, level);
        }

        let censored = self.censor(&text);
        self.shared.log_model.lock().unwrap().append(level, censored);
    }

    pub fn emit_lines(&self, lines: &[String], default_level: LogLevel) {
        for line in lines {
            self.emit_log(line, default_level);
        }
    }

    fn censor(&self, line: &str) -> String {
        let filter = self.shared.censor_filter.lock().unwrap();
        let mut out = line.to_string();
        for (needle, replacement) in filter.iter() {
            out = out.replace(needle, replacement);
        }
        out
    }

    /// Enter the Waiting state until the controller calls `proceed()`.
    /// Resolves to Err(Aborted) when the launch is aborted instead.
    pub async fn ready_for_launch(&self) -> LauncherResult<()> {
        let notified = self.shared.proceed_notify.notified();
        self.shared.set_state(LaunchState::Waiting);
        self.task.set_status("Waiting for launch to proceed");
        debug!("Launch is ready, waiting for proceed");

        tokio::select! {
            _ = notified => {
                self.shared.set_state(LaunchState::Running);
                Ok(())
            }
            _ = self.task.cancelled() => Err(LauncherError::Aborted),
        }
    }
}

/// External control surface of a running launch, cloneable into UI land.
#[derive(Clone)]
pub struct LaunchController {
    shared: Arc<LaunchShared>,
    task: TaskHandle,
    current_step: Arc<Mutex<StepAbort>>,
}

impl LaunchController {
    pub fn state(&self) -> LaunchState {
        self.shared.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<LaunchState> {
        self.shared.state.subscribe()
    }

    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    /// Resume a launch paused at the ready-for-launch gate. Only
    /// meaningful while Waiting.
    pub fn proceed(&self) {
        if self.state() == LaunchState::Waiting {
            self.shared.proceed_notify.notify_waiters();
        }
    }

    pub fn can_abort(&self) -> bool {
        match self.state() {
            LaunchState::Aborted | LaunchState::Failed | LaunchState::Finished => false,
            LaunchState::NotStarted => true,
            LaunchState::Running | LaunchState::Waiting => {
                self.current_step.lock().unwrap().can_abort()
            }
        }
    }

    /// Request cancellation. Terminal states report trivially; before the
    /// launch starts the task fails immediately; while running the request
    /// is delegated to the active step.
    pub fn abort(&self) -> bool {
        match self.state() {
            LaunchState::Aborted | LaunchState::Failed | LaunchState::Finished => true,
            LaunchState::NotStarted => {
                self.shared.set_state(LaunchState::Aborted);
                self.task.request_abort();
                true
            }
            LaunchState::Running | LaunchState::Waiting => {
                let step = self.current_step.lock().unwrap().clone();
                if !step.can_abort() {
                    return false;
                }
                if step.abort() {
                    self.task.request_abort();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Run a closure against the live log model (e.g. to bind observers).
    pub fn with_log_model<R>(&self, f: impl FnOnce(&mut LogModel) -> R) -> R {
        f(&mut self.shared.log_model.lock().unwrap())
    }

    pub fn log_text(&self) -> String {
        self.shared.log_model.lock().unwrap().to_plain_text()
    }
}

pub struct LaunchTask {
    name: String,
    handle: TaskHandle,
    steps: Vec<Box<dyn LaunchStep>>,
    shared: Arc<LaunchShared>,
    current_step: Arc<Mutex<StepAbort>>,
}

impl LaunchTask {
    pub fn new(name: impl Into<String>, config: &LauncherConfig) -> Self {
        let mut log_model = LogModel::new(config.console_max_lines);
        log_model.set_stop_on_overflow(config.stop_on_console_overflow);
        log_model.set_overflow_message(format!(
            "Stopped watching the game log because the log length surpassed {} lines.",
            config.console_max_lines
        ));

        let shared = Arc::new(LaunchShared {
            state: watch::channel(LaunchState::NotStarted).0,
            proceed_notify: Notify::new(),
            log_model: Mutex::new(log_model),
            censor_filter: Mutex::new(HashMap::new()),
        });

        let handle = TaskHandle::new();
        handle.set_abortable(true);
        let current_step: Arc<Mutex<StepAbort>> = Arc::new(Mutex::new(StepAbort::default()));

        // the generic task-level abort delegates to the active step, same
        // as the controller does
        let hook_shared = shared.clone();
        let hook_step = current_step.clone();
        handle.set_abort_hook(Box::new(move || match hook_shared.state() {
            LaunchState::NotStarted => {
                hook_shared.set_state(LaunchState::Aborted);
                true
            }
            LaunchState::Running | LaunchState::Waiting => {
                let step = hook_step.lock().unwrap().clone();
                step.can_abort() && step.abort()
            }
            _ => false,
        }));

        Self {
            name: name.into(),
            handle,
            steps: Vec::new(),
            shared,
            current_step,
        }
    }

    pub fn controller(&self) -> LaunchController {
        LaunchController {
            shared: self.shared.clone(),
            task: self.handle.clone(),
            current_step: self.current_step.clone(),
        }
    }

    /// Replace the private-value redaction map applied to every log line.
    pub fn set_censor_filter(&self, filter: HashMap<String, String>) {
        *self.shared.censor_filter.lock().unwrap() = filter;
    }

    pub fn append_step(&mut self, step: Box<dyn LaunchStep>) -> LauncherResult<()> {
        if self.handle.state() != TaskState::NotStarted {
            return Err(LauncherError::TaskAlreadyRunning(self.name.clone()));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn prepend_step(&mut self, step: Box<dyn LaunchStep>) -> LauncherResult<()> {
        if self.handle.state() != TaskState::NotStarted {
            return Err(LauncherError::TaskAlreadyRunning(self.name.clone()));
        }
        self.steps.insert(0, step);
        Ok(())
    }

    /// Assemble the standard pipeline for a spec: banner, folders, optional
    /// pre-launch hook, libraries, natives, the game, optional post-exit
    /// hook.
    pub fn assemble(spec: LaunchSpec, config: &LauncherConfig) -> LauncherResult<Self> {
        use crate::core::launch::steps::{
            CreateGameFolders, DownloadLibraries, ExtractNatives, RunCommand, RunGame, TextPrint,
        };
        use crate::core::net::cache::MetaCache;

        let client = crate::core::http::build_http_client()?;
        let cache = Arc::new(MetaCache::load(config.meta_cache_path()));

        let mut task = Self::new(format!("Launch {}", spec.profile.id), config);
        task.set_censor_filter(spec.censor_filter);

        task.append_step(Box::new(TextPrint::new(
            format!("Launching version {}", spec.profile.id),
            LogLevel::Launcher,
        )))?;
        task.append_step(Box::new(CreateGameFolders::new(vec![
            spec.game_dir.clone(),
            spec.libraries_dir.clone(),
        ])))?;
        if let Some(command_line) = spec.pre_launch_command {
            task.append_step(Box::new(
                RunCommand::new("Pre-launch command", command_line)
                    .with_variables(spec.variables.clone())
                    .with_working_dir(spec.game_dir.clone()),
            ))?;
        }
        task.append_step(Box::new(
            DownloadLibraries::new(
                client,
                spec.profile.clone(),
                spec.libraries_dir.clone(),
                config.download_concurrency,
            )
            .with_cache(cache),
        ))?;
        task.append_step(Box::new(ExtractNatives::new(
            spec.profile,
            spec.libraries_dir,
            spec.natives_dir,
        )))?;
        task.append_step(Box::new(RunGame::new(spec.command)))?;
        if let Some(command_line) = spec.post_exit_command {
            task.append_step(Box::new(
                RunCommand::new("Post-exit command", command_line)
                    .with_variables(spec.variables)
                    .with_working_dir(spec.game_dir),
            ))?;
        }
        Ok(task)
    }
}

/// Everything one launch needs, resolved ahead of time: the profile, the
/// assembled game command, the directory layout and the operator hooks.
pub struct LaunchSpec {
    pub profile: std::sync::Arc<crate::core::version::profile::VersionProfile>,
    pub command: GameCommand,
    pub game_dir: std::path::PathBuf,
    pub natives_dir: std::path::PathBuf,
    pub libraries_dir: std::path::PathBuf,
    pub pre_launch_command: Option<String>,
    pub post_exit_command: Option<String>,
    /// Substitution environment for hook command lines.
    pub variables: HashMap<String, String>,
    /// Redactions applied to every log line.
    pub censor_filter: HashMap<String, String>,
}

#[async_trait]
impl Task for LaunchTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        // an abort that arrived before the start wins immediately
        if self.handle.abort_requested() || self.shared.state() == LaunchState::Aborted {
            self.shared.set_state(LaunchState::Aborted);
            return Err(LauncherError::Aborted);
        }

        self.shared.set_state(LaunchState::Running);
        if self.steps.is_empty() {
            self.shared.set_state(LaunchState::Finished);
            return Ok(());
        }

        let ctx = StepContext {
            shared: self.shared.clone(),
            task: self.handle.clone(),
        };

        let total = self.steps.len() as u64;
        let mut outcome: LauncherResult<()> = Ok(());
        let mut last_started = 0;

        for (index, step) in self.steps.iter_mut().enumerate() {
            last_started = index;
            *self.current_step.lock().unwrap() = step.abort_handle();
            self.handle.set_status(step.name().to_string());
            self.handle.set_progress(index as u64, total);
            debug!("Launch step '{}' starting", step.name());

            if let Err(e) = step.perform(&ctx).await {
                debug!("Launch step '{}' failed: {}", step.name(), e);
                outcome = Err(e);
                break;
            }
        }
        *self.current_step.lock().unwrap() = StepAbort::default();

        // unwind: later steps are torn down before earlier ones, and only
        // then does the task signal its own outcome
        for index in (0..=last_started).rev() {
            self.steps[index].finalize(&ctx).await;
        }

        match outcome {
            Ok(()) => {
                self.handle.set_progress(total, total);
                self.shared.set_state(LaunchState::Finished);
                Ok(())
            }
            Err(e) if e.is_abort() => {
                self.shared.set_state(LaunchState::Aborted);
                Err(e)
            }
            Err(e) => {
                self.shared.set_state(LaunchState::Failed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{run, TaskEvent};

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct RecordingStep {
        name: String,
        outcome: Result<(), String>,
        events: EventLog,
    }

    impl RecordingStep {
        fn ok(name: &str, events: &EventLog) -> Box<Self> {
            Box::new(Self {
                name: name.into(),
                outcome: Ok(()),
                events: events.clone(),
            })
        }

        fn failing(name: &str, reason: &str, events: &EventLog) -> Box<Self> {
            Box::new(Self {
                name: name.into(),
                outcome: Err(reason.into()),
                events: events.clone(),
            })
        }
    }

    #[async_trait]
    impl LaunchStep for RecordingStep {
        fn name(&self) -> &str {
            &self.name
        }

        async fn perform(&mut self, _ctx: &StepContext) -> LauncherResult<()> {
            self.events.lock().unwrap().push(format!("perform {}", self.name));
            self.outcome.clone().map_err(LauncherError::Other)
        }

        async fn finalize(&mut self, _ctx: &StepContext) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finalize {}", self.name));
        }
    }

    fn task_with_steps(steps: Vec<Box<dyn LaunchStep>>) -> LaunchTask {
        let mut task = LaunchTask::new("launch", &LauncherConfig::default());
        for step in steps {
            task.append_step(step).unwrap();
        }
        task
    }

    #[tokio::test]
    async fn zero_steps_succeed_with_nothing_logged() {
        let mut task = task_with_steps(Vec::new());
        let controller = task.controller();
        assert_eq!(run(&mut task).await, TaskState::Succeeded);
        assert_eq!(controller.state(), LaunchState::Finished);
        assert!(controller.log_text().is_empty());
    }

    #[tokio::test]
    async fn finalize_runs_in_reverse_before_the_failure_signal() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut task = task_with_steps(vec![
            RecordingStep::ok("A", &events),
            RecordingStep::ok("B", &events),
            RecordingStep::failing("C", "step C broke", &events),
        ]);

        let signal_log = events.clone();
        task.handle().subscribe(Arc::new(move |event| {
            if let TaskEvent::Failed(_) = event {
                signal_log.lock().unwrap().push("task failed".into());
            }
        }));

        assert_eq!(run(&mut task).await, TaskState::Failed);
        assert_eq!(task.handle().fail_reason().as_deref(), Some("step C broke"));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "perform A",
                "perform B",
                "perform C",
                "finalize C",
                "finalize B",
                "finalize A",
                "task failed",
            ]
        );
    }

    #[tokio::test]
    async fn success_still_finalizes_every_step() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut task = task_with_steps(vec![
            RecordingStep::ok("A", &events),
            RecordingStep::ok("B", &events),
        ]);
        assert_eq!(run(&mut task).await, TaskState::Succeeded);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["perform A", "perform B", "finalize B", "finalize A"]
        );
    }

    #[tokio::test]
    async fn abort_before_start_fails_immediately() {
        let mut task = task_with_steps(vec![]);
        let controller = task.controller();
        assert!(controller.abort());
        assert_eq!(controller.state(), LaunchState::Aborted);
        assert_eq!(run(&mut task).await, TaskState::Aborted);
    }

    #[tokio::test]
    async fn steps_added_after_start_are_rejected() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut task = task_with_steps(vec![RecordingStep::ok("A", &events)]);
        run(&mut task).await;
        let err = task
            .append_step(RecordingStep::ok("late", &events))
            .unwrap_err();
        assert!(matches!(err, LauncherError::TaskAlreadyRunning(_)));
    }

    // ── Log routing ─────────────────────────────────────

    fn context_of(task: &LaunchTask) -> StepContext {
        StepContext {
            shared: task.shared.clone(),
            task: task.handle.clone(),
        }
    }

    #[tokio::test]
    async fn explicit_marker_overrides_and_strips() {
        let task = task_with_steps(vec![]);
        let ctx = context_of(&task);
        ctx.emit_log("!![Warning]!watch out", LogLevel::StdOut);

        let controller = task.controller();
        controller.with_log_model(|model| {
            let line = model.get(0).unwrap();
            assert_eq!(line.level, LogLevel::Warning);
            assert_eq!(line.text, "watch out");
        });
    }

    #[tokio::test]
    async fn ambiguous_levels_go_through_the_guesser() {
        let task = task_with_steps(vec![]);
        let ctx = context_of(&task);
        ctx.emit_log("[12:00:00] [main/ERROR]: it broke", LogLevel::StdOut);
        task.controller().with_log_model(|model| {
            assert_eq!(model.get(0).unwrap().level, LogLevel::Error);
        });
    }

    #[tokio::test]
    async fn censor_filter_redacts_private_values() {
        let task = task_with_steps(vec![]);
        task.set_censor_filter(HashMap::from([(
            "secret-token".to_string(),
            "<ACCESS TOKEN>".to_string(),
        )]));
        let ctx = context_of(&task);
        ctx.emit_log("logging in with secret-token now", LogLevel::StdOut);
        assert_eq!(
            task.controller().log_text(),
            "logging in with <ACCESS TOKEN> now\n"
        );
    }

    // ── Waiting / proceed ───────────────────────────────

    struct PausingStep;

    #[async_trait]
    impl LaunchStep for PausingStep {
        fn name(&self) -> &str {
            "pause"
        }

        async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
            ctx.ready_for_launch().await
        }
    }

    #[tokio::test]
    async fn proceed_releases_a_waiting_launch() {
        let mut task = task_with_steps(vec![Box::new(PausingStep)]);
        let controller = task.controller();
        let mut watch = controller.state_watch();

        let runner = tokio::spawn(async move { run(&mut task).await });
        // wait until the step parks itself
        while *watch.borrow() != LaunchState::Waiting {
            watch.changed().await.unwrap();
        }
        controller.proceed();

        assert_eq!(runner.await.unwrap(), TaskState::Succeeded);
        assert_eq!(controller.state(), LaunchState::Finished);
    }

    #[tokio::test]
    async fn assemble_orders_the_standard_pipeline() {
        let profile = Arc::new(
            crate::core::version::profile::VersionProfile::parse(
                r#"{"id": "1.6.4", "mainClass": "net.minecraft.client.main.Main"}"#,
            )
            .unwrap(),
        );
        let base = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            profile: profile.clone(),
            command: GameCommand::from_profile(
                &profile,
                "/usr/bin/java",
                base.path().join("game"),
                &HashMap::new(),
            ),
            game_dir: base.path().join("game"),
            natives_dir: base.path().join("natives"),
            libraries_dir: base.path().join("libraries"),
            pre_launch_command: Some("echo before".into()),
            post_exit_command: None,
            variables: HashMap::new(),
            censor_filter: HashMap::new(),
        };

        let mut config = LauncherConfig::default();
        config.data_dir = base.path().to_path_buf();
        let task = LaunchTask::assemble(spec, &config).unwrap();

        let names: Vec<&str> = task.steps.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "Print",
                "Create folders",
                "Pre-launch command",
                "Download libraries",
                "Extract natives",
                "Launch game",
            ]
        );
    }

    #[tokio::test]
    async fn proceed_outside_waiting_is_a_no_op() {
        let task = task_with_steps(vec![]);
        let controller = task.controller();
        controller.proceed();
        assert_eq!(controller.state(), LaunchState::NotStarted);
    }
}
