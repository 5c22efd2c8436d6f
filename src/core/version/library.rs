// ─── Libraries ───
// A library dependency from a version manifest: Maven-style coordinate,
// optional native classifiers, rules, and the derived storage/download
// locations.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::rule::{evaluate, RawRule, Rule};

pub const DEFAULT_LIBRARY_REPO: &str = "https://libraries.minecraft.net/";

/// A `group:artifact:version[:classifier]` coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradleSpecifier {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl GradleSpecifier {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let (group, artifact, version, classifier) = match parts.as_slice() {
            [group, artifact, version] => (*group, *artifact, *version, None),
            [group, artifact, version, classifier] => {
                (*group, *artifact, *version, Some(classifier.to_string()))
            }
            _ => return Err(LauncherError::InvalidCoordinate(raw.to_string())),
        };
        if group.is_empty() || artifact.is_empty() || version.is_empty() {
            return Err(LauncherError::InvalidCoordinate(raw.to_string()));
        }
        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier,
        })
    }

    /// `group:artifact`, useful for deduplication across versions.
    pub fn artifact_prefix(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }

    /// Repository-relative path of the jar, with an optional extra
    /// classifier suffix (used for natives).
    pub fn path_with_suffix(&self, suffix: Option<&str>) -> String {
        let mut file = format!("{}-{}", self.artifact, self.version);
        if let Some(classifier) = &self.classifier {
            file.push('-');
            file.push_str(classifier);
        }
        if let Some(suffix) = suffix {
            file.push('-');
            file.push_str(suffix);
        }
        format!(
            "{}/{}/{}/{}.jar",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            file
        )
    }
}

impl fmt::Display for GradleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// A resolved library. Immutable once built from its manifest entry.
#[derive(Debug, Clone)]
pub struct Library {
    pub name: GradleSpecifier,
    /// Base repository override; the default library repo otherwise.
    pub repository_url: Option<String>,
    /// OS name → native classifier suffix (may contain `${arch}`).
    pub natives: BTreeMap<String, String>,
    pub rules: Vec<Rule>,
    /// Path prefixes excluded when extracting a native jar.
    pub extract_excludes: Vec<String>,
}

impl Library {
    pub fn from_name(name: &str) -> LauncherResult<Self> {
        Ok(Self {
            name: GradleSpecifier::parse(name)?,
            repository_url: None,
            natives: BTreeMap::new(),
            rules: Vec::new(),
            extract_excludes: Vec::new(),
        })
    }

    pub fn is_native(&self) -> bool {
        !self.natives.is_empty()
    }

    /// The native classifier suffix for `os`, with `${arch}` substituted
    /// for the running architecture.
    pub fn native_suffix(&self, os: &str) -> Option<String> {
        self.natives
            .get(os)
            .map(|suffix| suffix.replace("${arch}", current_arch_bits()))
    }

    /// Whether this library participates in a launch on `os`.
    ///
    /// Rule evaluation is last-match-wins with an implicit initial
    /// Disallow; no rules at all means allowed. A native library is
    /// additionally gated on having a classifier for `os`.
    pub fn is_active(&self, os: &str) -> bool {
        let allowed = self.rules.is_empty() || evaluate(&self.rules, os);
        if !allowed {
            return false;
        }
        if self.is_native() {
            self.native_suffix(os).is_some()
        } else {
            true
        }
    }

    /// Repository-relative storage path of the jar to fetch for `os`.
    /// None for a native library with no classifier on that OS.
    pub fn storage_path(&self, os: &str) -> Option<String> {
        if self.is_native() {
            let suffix = self.native_suffix(os)?;
            Some(self.name.path_with_suffix(Some(&suffix)))
        } else {
            Some(self.name.path_with_suffix(None))
        }
    }

    pub fn download_url(&self, os: &str) -> Option<String> {
        let base = self
            .repository_url
            .as_deref()
            .unwrap_or(DEFAULT_LIBRARY_REPO);
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.storage_path(os)?
        ))
    }
}

fn current_arch_bits() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "64"
    } else {
        "32"
    }
}

// ── Manifest form ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub rules: Option<Vec<RawRule>>,
    #[serde(default)]
    pub extract: Option<ExtractSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractSpec {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TryFrom<LibraryEntry> for Library {
    type Error = LauncherError;

    fn try_from(entry: LibraryEntry) -> LauncherResult<Self> {
        Ok(Library {
            name: GradleSpecifier::parse(&entry.name)?,
            repository_url: entry.url,
            natives: entry.natives.unwrap_or_default(),
            rules: entry
                .rules
                .map(|rules| rules.into_iter().map(Rule::from).collect())
                .unwrap_or_default(),
            extract_excludes: entry.extract.map(|e| e.exclude).unwrap_or_default(),
        })
    }
}
