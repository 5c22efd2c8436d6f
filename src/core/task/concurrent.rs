// ─── Concurrent Task ───
// Runs children with a concurrency cap.
//
// Failure policy: a failing child does not stop the others — the queue is
// drained completely and the composite then fails with the first failure's
// reason. Completions schedule the next start through the executor queue,
// never through direct recursion, so very large child counts cannot
// overflow the call stack.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::task::{run, Task, TaskEvent, TaskHandle, TaskState};

pub const DEFAULT_CONCURRENCY: usize = 6;

pub struct ConcurrentTask {
    name: String,
    handle: TaskHandle,
    children: Vec<Box<dyn Task>>,
    max_concurrent: usize,
    child_handles: Arc<Mutex<Vec<TaskHandle>>>,
}

impl ConcurrentTask {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        let handle = TaskHandle::new();
        handle.set_abortable(true);

        let child_handles: Arc<Mutex<Vec<TaskHandle>>> = Arc::new(Mutex::new(Vec::new()));
        let forward = child_handles.clone();
        handle.set_abort_hook(Box::new(move || {
            for child in forward.lock().unwrap().iter() {
                child.request_abort();
            }
            true
        }));

        Self {
            name: name.into(),
            handle,
            children: Vec::new(),
            max_concurrent: max_concurrent.max(1),
            child_handles,
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
impl Task for ConcurrentTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        let children = std::mem::take(&mut self.children);
        let total = children.len() as u64;
        if total == 0 {
            return Ok(());
        }

        *self.child_handles.lock().unwrap() =
            children.iter().map(|c| c.handle().clone()).collect();
        self.handle.set_progress(0, total);

        let parent = self.handle.clone();
        let child_futures: Vec<_> = children
            .into_iter()
            .map(|child| run_child(child, parent.clone()))
            .collect();
        let mut completions =
            stream::iter(child_futures).buffer_unordered(self.max_concurrent);

        let mut done = 0u64;
        let mut first_failure: Option<String> = None;
        let mut any_aborted = false;

        while let Some(child) = completions.next().await {
            done += 1;
            self.handle.set_progress(done, total);
            self.handle
                .set_status(format!("Executing tasks ({done} out of {total} are done)"));

            match child.handle().state() {
                TaskState::Failed if first_failure.is_none() => {
                    first_failure = child.handle().fail_reason();
                }
                TaskState::Aborted => any_aborted = true,
                _ => {}
            }
        }

        if let Some(reason) = first_failure {
            return Err(LauncherError::Other(reason));
        }
        if any_aborted || self.handle.abort_requested() {
            return Err(LauncherError::Aborted);
        }
        Ok(())
    }
}

async fn run_child(mut child: Box<dyn Task>, parent: TaskHandle) -> Box<dyn Task> {
    // an abort request empties the queue: children that have
    // not started yet never will
    if parent.abort_requested() {
        child.handle().mark_aborted();
        return child;
    }
    let status_sink = parent.clone();
    child.handle().subscribe(Arc::new(move |event| {
        if let TaskEvent::Status(text) = event {
            status_sink.set_step_status(text.clone());
        }
    }));
    run(child.as_mut()).await;
    child
}
