// ─── Multiple Options Task ───
// Tries children in order until one succeeds. Children after the first
// success are never started; if every option fails, the composite fails
// with the last failure's reason.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::task::{run, Task, TaskEvent, TaskHandle, TaskState};

pub struct MultipleOptionsTask {
    name: String,
    handle: TaskHandle,
    children: Vec<Box<dyn Task>>,
    current_child: Arc<Mutex<Option<TaskHandle>>>,
}

impl MultipleOptionsTask {
    pub fn new(name: impl Into<String>) -> Self {
        let handle = TaskHandle::new();
        handle.set_abortable(true);

        let current_child: Arc<Mutex<Option<TaskHandle>>> = Arc::new(Mutex::new(None));
        let forward = current_child.clone();
        handle.set_abort_hook(Box::new(move || {
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

    /// Queue an option. Rejected once the task has started.
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
impl Task for MultipleOptionsTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        if self.children.is_empty() {
            return Err(LauncherError::Other("No options to try".into()));
        }

        let total = self.children.len();
        let mut last_reason = String::new();

        for (index, child) in self.children.iter_mut().enumerate() {
            self.handle.check_aborted()?;

            *self.current_child.lock().unwrap() = Some(child.handle().clone());
            self.handle
                .set_status(format!("Attempting option {} of {}", index + 1, total));

            let status_sink = self.handle.clone();
            child.handle().subscribe(Arc::new(move |event| {
                if let TaskEvent::Status(text) = event {
                    status_sink.set_step_status(text.clone());
                }
            }));

            match run(child.as_mut()).await {
                TaskState::Succeeded => return Ok(()),
                TaskState::Aborted => return Err(LauncherError::Aborted),
                _ => {
                    last_reason = child
                        .handle()
                        .fail_reason()
                        .unwrap_or_else(|| "Option failed".into());
                }
            }
        }

        Err(LauncherError::Other(last_reason))
    }
}
