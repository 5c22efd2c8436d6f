// ─── Sequential Task ───
// Runs children strictly in order; the first failure stops the chain.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::task::{run, Task, TaskEvent, TaskHandle, TaskState};

/// Progress is reported against a fixed scale so child boundaries land on
/// stable fractions regardless of child count.
const PROGRESS_TOTAL: u64 = 1000;

pub struct SequentialTask {
    name: String,
    handle: TaskHandle,
    children: Vec<Box<dyn Task>>,
    current_child: Arc<Mutex<Option<TaskHandle>>>,
}

impl SequentialTask {
    pub fn new(name: impl Into<String>) -> Self {
        let handle = TaskHandle::new();
        handle.set_abortable(true);

        let current_child: Arc<Mutex<Option<TaskHandle>>> = Arc::new(Mutex::new(None));
        let forward = current_child.clone();
        handle.set_abort_hook(Box::new(move || {
            // forward the request to whichever child is active
            if let Some(child) = &*forward.lock().unwrap() {
                child.request_abort();
            }
            true
        }));

        Self {
            name: name.into(),
            handle,
            children: Vec::new(),
            current_child,
        }
    }

    /// Queue a child. Rejected once the task has started.
    pub fn add_task(&mut self, task: Box<dyn Task>) -> LauncherResult<()> {
        if self.handle.state() != TaskState::NotStarted {
            return Err(LauncherError::TaskAlreadyRunning(self.name.clone()));
        }
        self.children.push(task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Task for SequentialTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        let total = self.children.len() as u64;
        if total == 0 {
            return Ok(());
        }

        for (index, child) in self.children.iter_mut().enumerate() {
            self.handle.check_aborted()?;

            *self.current_child.lock().unwrap() = Some(child.handle().clone());
            self.handle.set_status(child.name().to_string());

            // Map the child's own progress into this child's slice of the
            // fixed scale.
            let parent = self.handle.clone();
            let base = index as u64 * PROGRESS_TOTAL / total;
            let next = (index as u64 + 1) * PROGRESS_TOTAL / total;
            child.handle().subscribe(Arc::new(move |event| match event {
                TaskEvent::Progress { current, total } if *total > 0 => {
                    let fraction = (next - base) * current / total;
                    parent.set_progress(base + fraction, PROGRESS_TOTAL);
                }
                TaskEvent::Status(text) => parent.set_step_status(text.clone()),
                _ => {}
            }));

            match run(child.as_mut()).await {
                TaskState::Succeeded => {
                    self.handle.set_progress(next, PROGRESS_TOTAL);
                }
                TaskState::Aborted => return Err(LauncherError::Aborted),
                TaskState::Failed => {
                    let reason = child
                        .handle()
                        .fail_reason()
                        .unwrap_or_else(|| "Subtask failed".into());
                    return Err(LauncherError::Other(reason));
                }
                state => {
                    // a child that was already driven elsewhere is a bug in
                    // the owner
                    return Err(LauncherError::Other(format!(
                        "Subtask '{}' was in unexpected state {:?}",
                        child.name(),
                        state
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::testing::StubTask;

    #[tokio::test]
    async fn runs_children_in_order_and_fails_fast() {
        let mut seq = SequentialTask::new("seq");
        let t1 = StubTask::ok("t1");
        let t2 = StubTask::failing("t2", "boom");
        let t3 = StubTask::ok("t3");
        let h1 = t1.handle().clone();
        let h3 = t3.handle().clone();
        seq.add_task(Box::new(t1)).unwrap();
        seq.add_task(Box::new(t2)).unwrap();
        seq.add_task(Box::new(t3)).unwrap();

        assert_eq!(run(&mut seq).await, TaskState::Failed);
        assert_eq!(seq.handle().fail_reason().as_deref(), Some("boom"));
        assert_eq!(h1.state(), TaskState::Succeeded);
        // the task after the failure must never have started
        assert_eq!(h3.state(), TaskState::NotStarted);
    }

    #[tokio::test]
    async fn empty_sequence_succeeds() {
        let mut seq = SequentialTask::new("seq");
        assert_eq!(run(&mut seq).await, TaskState::Succeeded);
    }

    #[tokio::test]
    async fn progress_advances_per_completed_child() {
        let mut seq = SequentialTask::new("seq");
        for i in 0..4 {
            seq.add_task(Box::new(StubTask::ok(&format!("t{i}")))).unwrap();
        }
        run(&mut seq).await;
        assert_eq!(seq.handle().progress(), (PROGRESS_TOTAL, PROGRESS_TOTAL));
    }

    #[tokio::test]
    async fn rejects_children_added_after_start() {
        let mut seq = SequentialTask::new("seq");
        seq.add_task(Box::new(StubTask::ok("t"))).unwrap();
        run(&mut seq).await;
        let err = seq.add_task(Box::new(StubTask::ok("late"))).unwrap_err();
        assert!(matches!(err, LauncherError::TaskAlreadyRunning(_)));
    }

    #[tokio::test]
    async fn abort_stops_before_the_next_child() {
        let mut seq = SequentialTask::new("seq");
        seq.add_task(Box::new(StubTask::slow(
            "slow",
            std::time::Duration::from_secs(60),
        )))
        .unwrap();
        seq.add_task(Box::new(StubTask::ok("after"))).unwrap();

        let handle = seq.handle().clone();
        let runner = tokio::spawn(async move { run(&mut seq).await });
        tokio::task::yield_now().await;
        assert!(handle.abort());
        assert_eq!(runner.await.unwrap(), TaskState::Aborted);
    }
}
