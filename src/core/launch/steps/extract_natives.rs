use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::{LaunchStep, StepContext};
use crate::core::log::level::LogLevel;
use crate::core::version::profile::VersionProfile;
use crate::core::version::rule::current_os_name;

/// Unpacks the active native jars into the instance's natives directory,
/// honoring each library's extract-exclude patterns. The directory is
/// removed again when the launch winds down.
pub struct ExtractNatives {
    profile: Arc<VersionProfile>,
    libraries_dir: PathBuf,
    natives_dir: PathBuf,
}

impl ExtractNatives {
    pub fn new(
        profile: Arc<VersionProfile>,
        libraries_dir: impl Into<PathBuf>,
        natives_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            profile,
            libraries_dir: libraries_dir.into(),
            natives_dir: natives_dir.into(),
        }
    }
}

#[async_trait]
impl LaunchStep for ExtractNatives {
    fn name(&self) -> &str {
        "Extract natives"
    }

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
        let os = current_os_name();
        let natives = self.profile.active_natives(os);
        if natives.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.natives_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.natives_dir.clone(),
                source: e,
            })?;

        for library in natives {
            let Some(path) = library.storage_path(os) else {
                continue;
            };
            let jar = self.libraries_dir.join(&path);
            let dest = self.natives_dir.clone();
            let excludes = library.extract_excludes.clone();
            tokio::task::spawn_blocking(move || extract_jar(&jar, &dest, &excludes))
                .await
                .map_err(|e| LauncherError::Other(format!("Native extraction panicked: {e}")))??;
        }
        ctx.emit_log("Extracted native libraries.", LogLevel::Launcher);
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &StepContext) {
        // natives are per-run scratch data
        if let Err(e) = tokio::fs::remove_dir_all(&self.natives_dir).await {
            debug!("Leaving natives dir {:?} behind: {}", self.natives_dir, e);
        }
    }
}

fn extract_jar(jar: &Path, dest: &Path, excludes: &[String]) -> LauncherResult<()> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::Io {
        path: jar.to_path_buf(),
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if excludes.iter().any(|prefix| name.starts_with(prefix)) {
            continue;
        }
        // refuse entries that would escape the destination
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::Io {
                path: out_path.clone(),
                source: e,
            })?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(|e| LauncherError::Io {
            path: out_path.clone(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::Io {
            path: out_path.clone(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_test_jar(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("libtest.so", options).unwrap();
        writer.write_all(b"native code").unwrap();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(b"Manifest-Version: 1.0").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn excluded_prefixes_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("natives.jar");
        let out = dir.path().join("natives");
        write_test_jar(&jar);

        extract_jar(&jar, &out, &["META-INF/".to_string()]).unwrap();
        assert!(out.join("libtest.so").is_file());
        assert!(!out.join("META-INF").exists());
    }

    #[test]
    fn without_excludes_everything_lands() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("natives.jar");
        let out = dir.path().join("natives");
        write_test_jar(&jar);

        extract_jar(&jar, &out, &[]).unwrap();
        assert!(out.join("libtest.so").is_file());
        assert!(out.join("META-INF/MANIFEST.MF").is_file());
    }
}
