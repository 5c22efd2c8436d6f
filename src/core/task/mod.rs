// ─── Task Core ───
// Asynchronous, cancellable units of work with observable state.
//
// A task is a state machine (NotStarted → Running → one terminal state)
// driven by `run()`. Observers receive progress/status/terminal events for
// UI binding. Cancellation is cooperative: `TaskHandle::abort()` requests
// it, the executing future observes the request and bails out with
// `LauncherError::Aborted`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

pub mod concurrent;
pub mod multiple_options;
pub mod sequential;

pub use concurrent::ConcurrentTask;
pub use multiple_options::MultipleOptionsTask;
pub use sequential::SequentialTask;

/// Lifecycle of a task. Terminal states are final: no transition ever
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Aborted
        )
    }
}

/// Notifications delivered to task observers.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started,
    Progress { current: u64, total: u64 },
    Status(String),
    StepStatus(String),
    Succeeded,
    Failed(String),
    Aborted,
}

pub type TaskObserver = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

type AbortHook = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct TaskShared {
    state: Mutex<TaskState>,
    progress: Mutex<(u64, u64)>,
    status: Mutex<String>,
    step_status: Mutex<String>,
    fail_reason: Mutex<Option<String>>,
    observers: Mutex<Vec<TaskObserver>>,
    abortable: AtomicBool,
    abort_requested: AtomicBool,
    abort_notify: Notify,
    abort_hook: Mutex<Option<AbortHook>>,
}

/// Cloneable shared view of one task's observable state.
///
/// The handle outlives the `execute()` borrow, so owners keep a clone to
/// watch progress or request cancellation while the task runs.
#[derive(Clone, Default)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: TaskObserver) {
        self.shared.observers.lock().unwrap().push(observer);
    }

    fn notify(&self, event: TaskEvent) {
        // Snapshot under the lock, call outside it: observers may read the
        // handle back.
        let observers = self.shared.observers.lock().unwrap().clone();
        for observer in &observers {
            observer(&event);
        }
    }

    // ── Queries ─────────────────────────────────────────

    pub fn state(&self) -> TaskState {
        *self.shared.state.lock().unwrap()
    }

    pub fn progress(&self) -> (u64, u64) {
        *self.shared.progress.lock().unwrap()
    }

    pub fn status(&self) -> String {
        self.shared.status.lock().unwrap().clone()
    }

    pub fn step_status(&self) -> String {
        self.shared.step_status.lock().unwrap().clone()
    }

    pub fn fail_reason(&self) -> Option<String> {
        self.shared.fail_reason.lock().unwrap().clone()
    }

    pub fn was_successful(&self) -> bool {
        self.state() == TaskState::Succeeded
    }

    // ── Reporting (used by the executing task) ──────────

    pub fn set_progress(&self, current: u64, total: u64) {
        *self.shared.progress.lock().unwrap() = (current, total);
        self.notify(TaskEvent::Progress { current, total });
    }

    pub fn set_status(&self, text: impl Into<String>) {
        let text = text.into();
        *self.shared.status.lock().unwrap() = text.clone();
        self.notify(TaskEvent::Status(text));
    }

    pub fn set_step_status(&self, text: impl Into<String>) {
        let text = text.into();
        *self.shared.step_status.lock().unwrap() = text.clone();
        self.notify(TaskEvent::StepStatus(text));
    }

    // ── Transitions ─────────────────────────────────────

    /// NotStarted → Running. Returns false (and does nothing) from any
    /// other state.
    fn begin(&self) -> bool {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != TaskState::NotStarted {
                return false;
            }
            *state = TaskState::Running;
        }
        self.notify(TaskEvent::Started);
        true
    }

    fn enter_terminal(&self, next: TaskState) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    fn succeed(&self) -> bool {
        if !self.enter_terminal(TaskState::Succeeded) {
            return false;
        }
        self.notify(TaskEvent::Succeeded);
        true
    }

    fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if !self.enter_terminal(TaskState::Failed) {
            return false;
        }
        *self.shared.fail_reason.lock().unwrap() = Some(reason.clone());
        self.notify(TaskEvent::Failed(reason));
        true
    }

    pub(crate) fn mark_aborted(&self) -> bool {
        if !self.enter_terminal(TaskState::Aborted) {
            return false;
        }
        self.notify(TaskEvent::Aborted);
        true
    }

    // ── Cancellation ────────────────────────────────────

    /// Declare whether this task accepts abort requests at all.
    pub fn set_abortable(&self, abortable: bool) {
        self.shared.abortable.store(abortable, Ordering::SeqCst);
    }

    /// Install custom accept/forward logic run when an abort is requested
    /// (e.g. forward the request to the active child, kill a process).
    /// Returning false rejects the request.
    pub fn set_abort_hook(&self, hook: AbortHook) {
        *self.shared.abort_hook.lock().unwrap() = Some(hook);
    }

    pub fn can_abort(&self) -> bool {
        !self.state().is_terminal() && self.shared.abortable.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation. Returns whether the request was
    /// accepted. Idempotent once the task has reached Aborted.
    pub fn abort(&self) -> bool {
        if self.state() == TaskState::Aborted {
            return true;
        }
        if !self.can_abort() {
            return false;
        }
        let accepted = match &*self.shared.abort_hook.lock().unwrap() {
            Some(hook) => hook(),
            None => true,
        };
        if accepted {
            self.request_abort();
        }
        accepted
    }

    /// Raise the abort flag and wake any `cancelled()` waiters without
    /// going through `can_abort` checks.
    pub(crate) fn request_abort(&self) {
        self.shared.abort_requested.store(true, Ordering::SeqCst);
        self.shared.abort_notify.notify_waiters();
    }

    pub fn abort_requested(&self) -> bool {
        self.shared.abort_requested.load(Ordering::SeqCst)
    }

    /// Resolve once an abort has been requested. Used in `select!` around
    /// suspension points.
    pub async fn cancelled(&self) {
        loop {
            if self.abort_requested() {
                return;
            }
            let notified = self.shared.abort_notify.notified();
            if self.abort_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Bail out with `LauncherError::Aborted` when cancellation was
    /// requested.
    pub fn check_aborted(&self) -> LauncherResult<()> {
        if self.abort_requested() {
            Err(LauncherError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// One unit of asynchronous work.
///
/// Implementations report through their handle and return the outcome from
/// `execute`; `run()` translates it into the terminal state and fires the
/// matching event exactly once.
#[async_trait]
pub trait Task: Send {
    fn name(&self) -> &str;

    fn handle(&self) -> &TaskHandle;

    async fn execute(&mut self) -> LauncherResult<()>;
}

/// Drive a task to completion.
///
/// Starting anything but a NotStarted task is a no-op returning the current
/// state, so a task can only ever run once.
pub async fn run(task: &mut dyn Task) -> TaskState {
    let handle = task.handle().clone();
    if !handle.begin() {
        debug!("Ignoring start of task '{}' in state {:?}", task.name(), handle.state());
        return handle.state();
    }

    let result = task.execute().await;
    match result {
        Ok(()) => {
            handle.succeed();
        }
        Err(e) if e.is_abort() => {
            debug!("Task '{}' aborted", task.name());
            handle.mark_aborted();
        }
        Err(e) => {
            debug!("Task '{}' failed: {}", task.name(), e);
            handle.fail(e.to_string());
        }
    }
    handle.state()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// Scripted leaf task for composite tests.
    pub struct StubTask {
        name: String,
        handle: TaskHandle,
        outcome: Result<(), String>,
        delay: Option<Duration>,
    }

    impl StubTask {
        pub fn ok(name: &str) -> Self {
            Self {
                name: name.into(),
                handle: TaskHandle::new(),
                outcome: Ok(()),
                delay: None,
            }
        }

        pub fn failing(name: &str, reason: &str) -> Self {
            Self {
                name: name.into(),
                handle: TaskHandle::new(),
                outcome: Err(reason.into()),
                delay: None,
            }
        }

        pub fn slow(name: &str, delay: Duration) -> Self {
            let task = Self::ok(name);
            task.handle.set_abortable(true);
            Self {
                delay: Some(delay),
                ..task
            }
        }
    }

    #[async_trait]
    impl Task for StubTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle(&self) -> &TaskHandle {
            &self.handle
        }

        async fn execute(&mut self) -> LauncherResult<()> {
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.handle.cancelled() => return Err(LauncherError::Aborted),
                }
            }
            self.outcome
                .clone()
                .map_err(LauncherError::Other)
        }
    }
}
