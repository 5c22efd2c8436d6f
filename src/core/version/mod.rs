pub mod library;
pub mod profile;
pub mod rule;

pub use library::{GradleSpecifier, Library, LibraryEntry};
pub use profile::{VersionProfile, CURRENT_MINIMUM_LAUNCHER_VERSION};
pub use rule::{current_os_name, evaluate, Rule, RuleAction, Verdict};
