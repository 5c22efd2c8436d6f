// ─── Version Profile ───
// Parses a version manifest into the resolved profile a launch consumes.
// Dispatches on the manifest's `minimumLauncherVersion` marker and maps the
// pre-`minecraftArguments` era's `processArguments` literals onto their
// fixed templates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::library::{Library, LibraryEntry};

/// Newest manifest format this launcher understands.
pub const CURRENT_MINIMUM_LAUNCHER_VERSION: i64 = 21;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionDocument {
    id: Option<String>,
    main_class: Option<String>,
    #[serde(default)]
    minecraft_arguments: Option<String>,
    #[serde(default)]
    process_arguments: Option<String>,
    #[serde(default)]
    minimum_launcher_version: Option<i64>,
    #[serde(default)]
    release_time: Option<DateTime<Utc>>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    libraries: Vec<LibraryEntry>,
}

/// The fully resolved version data for one instance. Immutable once built;
/// a reload replaces the whole profile.
#[derive(Debug, Clone)]
pub struct VersionProfile {
    pub id: String,
    pub main_class: String,
    /// Game argument template, `${variable}` placeholders included.
    pub minecraft_arguments: String,
    pub minimum_launcher_version: i64,
    pub release_time: Option<DateTime<Utc>>,
    pub time: Option<DateTime<Utc>>,
    pub libraries: Vec<Library>,
    /// True when the arguments came from the legacy `processArguments`
    /// literals rather than a `minecraftArguments` template.
    pub is_legacy: bool,
}

impl VersionProfile {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let doc: VersionDocument = serde_json::from_str(raw)?;

        let format = doc.minimum_launcher_version.unwrap_or(0);
        if format > CURRENT_MINIMUM_LAUNCHER_VERSION {
            return Err(LauncherError::VersionFormat(format!(
                "the version requires launcher format {format}, but only formats up to \
                 {CURRENT_MINIMUM_LAUNCHER_VERSION} are supported"
            )));
        }

        let id = doc
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| LauncherError::VersionFormat("the version has no id".into()))?;
        let main_class = doc.main_class.filter(|m| !m.is_empty()).ok_or_else(|| {
            LauncherError::VersionFormat(format!("version '{id}' has no main class"))
        })?;

        let (minecraft_arguments, is_legacy) = match doc.minecraft_arguments {
            Some(args) => (args, false),
            None => {
                let process = doc.process_arguments.unwrap_or_else(|| "legacy".into());
                let args = match process.to_lowercase().as_str() {
                    "legacy" => " ${auth_player_name} ${auth_session}",
                    "username_session" => "--username ${auth_player_name} --session ${auth_session}",
                    "username_session_version" => {
                        "--username ${auth_player_name} --session ${auth_session} \
                         --version ${profile_name}"
                    }
                    other => {
                        return Err(LauncherError::VersionFormat(format!(
                            "processArguments is set to unknown value '{other}'"
                        )))
                    }
                };
                (args.to_string(), true)
            }
        };

        let libraries = doc
            .libraries
            .into_iter()
            .map(Library::try_from)
            .collect::<LauncherResult<Vec<_>>>()?;

        debug!("Parsed version '{}' with {} libraries", id, libraries.len());
        Ok(Self {
            id,
            main_class,
            minecraft_arguments,
            minimum_launcher_version: format,
            release_time: doc.release_time,
            time: doc.time,
            libraries,
            is_legacy,
        })
    }

    /// Parse a manifest that inherits from a parent document: the child's
    /// keys override the parent's, then the merged document is parsed as
    /// usual.
    pub fn parse_inherited(child_raw: &str, parent_raw: &str) -> LauncherResult<Self> {
        let child: serde_json::Value = serde_json::from_str(child_raw)?;
        let parent: serde_json::Value = serde_json::from_str(parent_raw)?;
        let merged = merge_with_parent(&child, &parent);
        Self::parse(&merged.to_string())
    }

    /// Active non-native libraries for `os`, in manifest order.
    pub fn active_libraries(&self, os: &str) -> Vec<&Library> {
        self.libraries
            .iter()
            .filter(|lib| !lib.is_native() && lib.is_active(os))
            .collect()
    }

    /// Active native libraries for `os`, in manifest order.
    pub fn active_natives(&self, os: &str) -> Vec<&Library> {
        self.libraries
            .iter()
            .filter(|lib| lib.is_native() && lib.is_active(os))
            .collect()
    }
}

/// Shallow inheritance merge: the parent is the base, every top-level key
/// present in the child replaces the parent's.
pub fn merge_with_parent(child: &serde_json::Value, parent: &serde_json::Value) -> serde_json::Value {
    let mut merged = parent.clone();
    if let (Some(merged_obj), Some(child_obj)) = (merged.as_object_mut(), child.as_object()) {
        for (key, value) in child_obj {
            merged_obj.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(extra: &str) -> String {
        format!(
            r#"{{
                "id": "1.6.4",
                "mainClass": "net.minecraft.client.main.Main",
                "minimumLauncherVersion": 13,
                "releaseTime": "2013-09-19T15:52:37+00:00",
                "time": "2013-09-19T15:52:37+00:00"
                {extra}
            }}"#
        )
    }

    #[test]
    fn parses_a_modern_document() {
        let profile = VersionProfile::parse(&sample(
            r#", "minecraftArguments": "--username ${auth_player_name}",
                "libraries": [
                    {"name": "com.paulscode:codecwav:20101023"},
                    {"name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.0",
                     "natives": {"linux": "natives-linux"},
                     "rules": [{"action": "allow"}]}
                ]"#,
        ))
        .unwrap();

        assert_eq!(profile.id, "1.6.4");
        assert!(!profile.is_legacy);
        assert_eq!(profile.libraries.len(), 2);
        assert_eq!(profile.active_libraries("linux").len(), 1);
        assert_eq!(profile.active_natives("linux").len(), 1);
        assert_eq!(profile.active_natives("windows").len(), 0);
    }

    #[test]
    fn maps_legacy_process_arguments() {
        let profile =
            VersionProfile::parse(&sample(r#", "processArguments": "username_session""#)).unwrap();
        assert!(profile.is_legacy);
        assert_eq!(
            profile.minecraft_arguments,
            "--username ${auth_player_name} --session ${auth_session}"
        );

        // absent entirely defaults to the bare legacy template
        let profile = VersionProfile::parse(&sample("")).unwrap();
        assert!(profile.is_legacy);
        assert_eq!(
            profile.minecraft_arguments,
            " ${auth_player_name} ${auth_session}"
        );
    }

    #[test]
    fn rejects_unknown_process_arguments() {
        let err = VersionProfile::parse(&sample(r#", "processArguments": "wat""#)).unwrap_err();
        assert!(matches!(err, LauncherError::VersionFormat(_)));
    }

    #[test]
    fn rejects_a_too_new_format() {
        let raw = r#"{
            "id": "future",
            "mainClass": "main.Main",
            "minimumLauncherVersion": 99
        }"#;
        let err = VersionProfile::parse(raw).unwrap_err();
        assert!(matches!(err, LauncherError::VersionFormat(_)));
    }

    #[test]
    fn child_keys_override_the_parent_on_inheritance() {
        let parent = r#"{
            "id": "1.6.4",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--username ${auth_player_name}",
            "libraries": [{"name": "a.b:base:1.0"}]
        }"#;
        let child = r#"{
            "id": "1.6.4-forge",
            "mainClass": "net.minecraft.launchwrapper.Launch",
            "libraries": [{"name": "a.b:loader:2.0"}, {"name": "a.b:extra:2.0"}]
        }"#;

        let profile = VersionProfile::parse_inherited(child, parent).unwrap();
        assert_eq!(profile.id, "1.6.4-forge");
        assert_eq!(profile.main_class, "net.minecraft.launchwrapper.Launch");
        // the argument template survives from the parent
        assert_eq!(profile.minecraft_arguments, "--username ${auth_player_name}");
        // libraries are replaced wholesale, not appended
        assert_eq!(profile.libraries.len(), 2);
    }

    #[test]
    fn rejects_documents_without_identity() {
        let err = VersionProfile::parse(r#"{"mainClass": "m.Main"}"#).unwrap_err();
        assert!(matches!(err, LauncherError::VersionFormat(_)));
    }
}
