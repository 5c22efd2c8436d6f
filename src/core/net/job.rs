// ─── Net Job ───
// Aggregates many downloads into one task. Parts run concurrently up to a
// cap; failed parts are re-queued for up to three rounds before the job
// reports failure with the URLs that never completed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::net::download::Download;
use crate::core::task::{Task, TaskHandle, TaskState};

const MAX_ROUNDS: usize = 3;

pub struct NetJob {
    name: String,
    handle: TaskHandle,
    parts: Vec<Download>,
    concurrency: usize,
    part_handles: Arc<Mutex<Vec<TaskHandle>>>,
    failed_urls: Vec<String>,
}

impl NetJob {
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        let handle = TaskHandle::new();
        handle.set_abortable(true);

        let part_handles: Arc<Mutex<Vec<TaskHandle>>> = Arc::new(Mutex::new(Vec::new()));
        let forward = part_handles.clone();
        handle.set_abort_hook(Box::new(move || {
            for part in forward.lock().unwrap().iter() {
                part.request_abort();
            }
            true
        }));

        Self {
            name: name.into(),
            handle,
            parts: Vec::new(),
            concurrency: concurrency.max(1),
            part_handles,
            failed_urls: Vec::new(),
        }
    }

    /// Queue a download. Rejected once the job has started.
    pub fn add_download(&mut self, download: Download) -> LauncherResult<()> {
        if self.handle.state() != TaskState::NotStarted {
            return Err(LauncherError::TaskAlreadyRunning(self.name.clone()));
        }
        self.parts.push(download);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// URLs that still had not completed when the job gave up.
    pub fn failed_urls(&self) -> &[String] {
        &self.failed_urls
    }
}

#[async_trait]
impl Task for NetJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        let total = self.parts.len() as u64;
        if total == 0 {
            return Ok(());
        }

        *self.part_handles.lock().unwrap() =
            self.parts.iter().map(|p| p.handle().clone()).collect();
        self.handle.set_progress(0, total);

        let mut pending: Vec<Download> = std::mem::take(&mut self.parts);
        let mut done: u64 = 0;

        for round in 1..=MAX_ROUNDS {
            if pending.is_empty() {
                break;
            }
            if round > 1 {
                debug!(
                    "Net job '{}': retrying {} failed downloads (round {} of {})",
                    self.name,
                    pending.len(),
                    round,
                    MAX_ROUNDS
                );
            }

            let parent = self.handle.clone();
            let results: Vec<(Download, LauncherResult<()>)> =
                stream::iter(pending.drain(..).map(|mut part| {
                    let parent = parent.clone();
                    async move {
                        let result = if parent.abort_requested() {
                            Err(LauncherError::Aborted)
                        } else {
                            part.perform().await
                        };
                        (part, result)
                    }
                }))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let mut failed = Vec::new();
            for (part, result) in results {
                match result {
                    Ok(()) => {
                        done += 1;
                        self.handle.set_progress(done, total);
                        self.handle.set_status(format!(
                            "Downloading ({done} out of {total} are done)"
                        ));
                    }
                    Err(e) if e.is_abort() => return Err(LauncherError::Aborted),
                    Err(e) => {
                        warn!("Net job '{}': part {} failed: {}", self.name, part.name(), e);
                        failed.push(part);
                    }
                }
            }
            pending = failed;
        }

        self.handle.check_aborted()?;

        if pending.is_empty() {
            return Ok(());
        }
        self.failed_urls = pending.iter().map(|p| p.primary_url().to_string()).collect();
        Err(LauncherError::JobFailed {
            failed: pending.len(),
            total: total as usize,
            first: self.failed_urls[0].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::run;
    use reqwest::Client;

    #[tokio::test]
    async fn empty_job_succeeds() {
        let mut job = NetJob::new("empty", 4);
        assert_eq!(run(&mut job).await, TaskState::Succeeded);
    }

    #[tokio::test]
    async fn rejects_downloads_added_after_start() {
        let mut job = NetJob::new("late", 4);
        run(&mut job).await;
        let err = job
            .add_download(Download::memory(Client::new(), "https://example.invalid/x"))
            .unwrap_err();
        assert!(matches!(err, LauncherError::TaskAlreadyRunning(_)));
    }
}
