use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::{LaunchStep, StepAbort, StepContext};
use crate::core::log::level::LogLevel;
use crate::core::net::cache::MetaCache;
use crate::core::net::download::Download;
use crate::core::net::job::NetJob;
use crate::core::task::{run, Task, TaskEvent, TaskHandle, TaskState};
use crate::core::version::profile::VersionProfile;
use crate::core::version::rule::current_os_name;

/// Builds a net job from the profile's active libraries (normal and
/// native) and runs it against the local library store.
pub struct DownloadLibraries {
    client: Client,
    profile: Arc<VersionProfile>,
    libraries_dir: PathBuf,
    cache: Option<Arc<MetaCache>>,
    concurrency: usize,
    job_handle: Arc<Mutex<Option<TaskHandle>>>,
}

impl DownloadLibraries {
    pub fn new(
        client: Client,
        profile: Arc<VersionProfile>,
        libraries_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            profile,
            libraries_dir: libraries_dir.into(),
            cache: None,
            concurrency,
            job_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Revalidate against this cache index instead of re-downloading
    /// libraries that are already present.
    pub fn with_cache(mut self, cache: Arc<MetaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn build_job(&self) -> LauncherResult<NetJob> {
        let os = current_os_name();
        let mut job = NetJob::new(
            format!("Libraries for {}", self.profile.id),
            self.concurrency,
        );

        for library in self.profile.libraries.iter().filter(|l| l.is_active(os)) {
            let Some(path) = library.storage_path(os) else {
                continue;
            };
            let Some(url) = library.download_url(os) else {
                continue;
            };
            let mut download = Download::file(self.client.clone(), url, self.libraries_dir.join(&path));
            if let Some(cache) = &self.cache {
                download = download.with_cache(cache.clone());
            }
            job.add_download(download)?;
        }
        Ok(job)
    }
}

#[async_trait]
impl LaunchStep for DownloadLibraries {
    fn name(&self) -> &str {
        "Download libraries"
    }

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
        let mut job = self.build_job()?;
        debug!(
            "Fetching {} libraries for version {}",
            job.len(),
            self.profile.id
        );
        ctx.emit_log(
            "Getting the library files required by the game...",
            LogLevel::Launcher,
        );

        *self.job_handle.lock().unwrap() = Some(job.handle().clone());
        let status_sink = ctx.task().clone();
        job.handle().subscribe(Arc::new(move |event| {
            if let TaskEvent::Status(text) = event {
                status_sink.set_step_status(text.clone());
            }
        }));

        match run(&mut job).await {
            TaskState::Succeeded => Ok(()),
            TaskState::Aborted => Err(LauncherError::Aborted),
            _ => Err(LauncherError::Other(
                job.handle()
                    .fail_reason()
                    .unwrap_or_else(|| "Library download failed".into()),
            )),
        }
    }

    fn abort_handle(&self) -> StepAbort {
        let slot = self.job_handle.clone();
        StepAbort::with(move || match &*slot.lock().unwrap() {
            Some(handle) => handle.abort(),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Arc<VersionProfile> {
        Arc::new(
            VersionProfile::parse(
                r#"{
                    "id": "1.6.4",
                    "mainClass": "net.minecraft.client.main.Main",
                    "libraries": [
                        {"name": "com.paulscode:codecwav:20101023"},
                        {"name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.0",
                         "natives": {"linux": "natives-linux", "windows": "natives-windows", "osx": "natives-osx"}},
                        {"name": "apple.only:thing:1.0",
                         "rules": [{"action": "allow", "os": {"name": "osx"}}]}
                    ]
                }"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn job_covers_exactly_the_active_libraries() {
        let step = DownloadLibraries::new(Client::new(), profile(), "/tmp/libraries", 4);
        let job = step.build_job().unwrap();
        let expected = if current_os_name() == "osx" { 3 } else { 2 };
        assert_eq!(job.len(), expected);
    }
}
