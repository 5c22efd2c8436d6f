use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::{LaunchStep, StepContext};

/// Ensures the directories a launch writes into exist before anything else
/// runs.
pub struct CreateGameFolders {
    dirs: Vec<PathBuf>,
}

impl CreateGameFolders {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl LaunchStep for CreateGameFolders {
    fn name(&self) -> &str {
        "Create folders"
    }

    async fn perform(&mut self, _ctx: &StepContext) -> LauncherResult<()> {
        for dir in &self.dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| LauncherError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }
}
