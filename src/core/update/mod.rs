// ─── Update Checker ───
// Self-update metadata: the channel list document and the per-channel
// version manifest, plus resolution of "is there something newer than the
// running build".

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::net::download::Download;
use crate::core::task::run;
use crate::core::task::Task;
use crate::core::task::TaskState;

/// Channel list format this launcher understands.
pub const CHANNEL_LIST_FORMAT_VERSION: i64 = 0;
/// Update manifest API version this launcher understands.
pub const UPDATE_API_VERSION: i64 = 0;

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChannelListDocument {
    format_version: i64,
    #[serde(default)]
    channels: Vec<UpdateChannel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateVersion {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateManifest {
    api_version: i64,
    #[serde(default)]
    versions: Vec<UpdateVersion>,
}

pub fn parse_channel_list(raw: &[u8]) -> LauncherResult<Vec<UpdateChannel>> {
    let doc: ChannelListDocument = serde_json::from_slice(raw)?;
    if doc.format_version != CHANNEL_LIST_FORMAT_VERSION {
        return Err(LauncherError::VersionFormat(format!(
            "unknown channel list format version {}",
            doc.format_version
        )));
    }
    Ok(doc.channels)
}

pub fn parse_update_manifest(raw: &[u8]) -> LauncherResult<Vec<UpdateVersion>> {
    let doc: UpdateManifest = serde_json::from_slice(raw)?;
    if doc.api_version != UPDATE_API_VERSION {
        return Err(LauncherError::VersionFormat(format!(
            "unknown update API version {}",
            doc.api_version
        )));
    }
    Ok(doc.versions)
}

/// Resolves the configured channel and reports the newest available build.
pub struct UpdateChecker {
    client: Client,
    channel_list_url: String,
    current_build: i64,
}

impl UpdateChecker {
    pub fn new(client: Client, channel_list_url: impl Into<String>, current_build: i64) -> Self {
        Self {
            client,
            channel_list_url: channel_list_url.into(),
            current_build,
        }
    }

    pub async fn channels(&self) -> LauncherResult<Vec<UpdateChannel>> {
        let raw = self.fetch(&self.channel_list_url).await?;
        parse_channel_list(&raw)
    }

    /// The newest version on `channel_id` that is ahead of the running
    /// build, or None when already current.
    pub async fn check_for_update(&self, channel_id: &str) -> LauncherResult<Option<UpdateVersion>> {
        let channels = self.channels().await?;
        let channel = channels
            .iter()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| {
                warn!("Channel '{}' not found in channel list", channel_id);
                LauncherError::Other(format!("Unknown update channel '{channel_id}'"))
            })?;

        let raw = self.fetch(&channel.url).await?;
        let versions = parse_update_manifest(&raw)?;

        let newest = versions.into_iter().max_by_key(|v| v.id);
        match newest {
            Some(version) if version.id > self.current_build => {
                debug!(
                    "Update available on '{}': build {} (running {})",
                    channel_id, version.id, self.current_build
                );
                Ok(Some(version))
            }
            _ => Ok(None),
        }
    }

    async fn fetch(&self, url: &str) -> LauncherResult<Vec<u8>> {
        let mut download = Download::memory(self.client.clone(), url);
        match run(&mut download).await {
            TaskState::Succeeded => download
                .take_bytes()
                .ok_or_else(|| LauncherError::Other(format!("Empty response from {url}"))),
            _ => Err(LauncherError::Other(
                download
                    .handle()
                    .fail_reason()
                    .unwrap_or_else(|| format!("Failed to fetch {url}")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_channel_list() {
        let channels = parse_channel_list(
            br#"{
                "format_version": 0,
                "channels": [
                    {"id": "stable", "name": "Stable", "description": "Don't break", "url": "https://updates.example/stable"},
                    {"id": "develop", "name": "Development", "url": "https://updates.example/develop"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "stable");
        assert_eq!(channels[1].description, "");
    }

    #[test]
    fn rejects_unknown_channel_list_format() {
        let err = parse_channel_list(br#"{"format_version": 9, "channels": []}"#).unwrap_err();
        assert!(matches!(err, LauncherError::VersionFormat(_)));
    }

    #[test]
    fn parses_an_update_manifest() {
        let versions = parse_update_manifest(
            br#"{
                "ApiVersion": 0,
                "Versions": [
                    {"Id": 10, "Name": "0.9"},
                    {"Id": 42, "Name": "1.0"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().map(|v| v.id).max(), Some(42));
    }

    #[test]
    fn rejects_unknown_api_version() {
        let err = parse_update_manifest(br#"{"ApiVersion": 3, "Versions": []}"#).unwrap_err();
        assert!(matches!(err, LauncherError::VersionFormat(_)));
    }

    #[test]
    fn malformed_documents_are_json_errors() {
        assert!(matches!(
            parse_channel_list(b"not json").unwrap_err(),
            LauncherError::Json(_)
        ));
    }
}
