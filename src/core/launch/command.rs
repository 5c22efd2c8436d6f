// ─── Game Command ───
// Assembles the java invocation for a launch: JVM arguments, classpath,
// main class and the game arguments produced from the profile's template.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::process::Command;

use crate::core::launch::substitution::expand_variables;
use crate::core::version::profile::VersionProfile;

pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Everything needed to spawn the game process.
#[derive(Debug, Clone)]
pub struct GameCommand {
    pub java_binary: PathBuf,
    pub jvm_args: Vec<String>,
    pub classpath: Vec<PathBuf>,
    pub main_class: String,
    pub game_args: Vec<String>,
    pub working_dir: PathBuf,
    /// Extra environment handed to the child on top of the inherited one.
    pub env: HashMap<String, String>,
}

impl GameCommand {
    /// Build a command for `profile`, expanding the argument template
    /// against `variables` (auth/session/path substitutions supplied by
    /// the caller).
    pub fn from_profile(
        profile: &VersionProfile,
        java_binary: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        variables: &HashMap<String, String>,
    ) -> Self {
        Self {
            java_binary: java_binary.into(),
            jvm_args: Vec::new(),
            classpath: Vec::new(),
            main_class: profile.main_class.clone(),
            game_args: build_game_args(&profile.minecraft_arguments, variables),
            working_dir: working_dir.into(),
            env: HashMap::new(),
        }
    }

    pub fn classpath_string(&self) -> String {
        self.classpath
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(classpath_separator())
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.java_binary);
        command.args(&self.jvm_args);
        if !self.classpath.is_empty() {
            command.arg("-cp").arg(self.classpath_string());
        }
        command.arg(&self.main_class);
        command.args(&self.game_args);
        command.current_dir(&self.working_dir);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }

    /// One-line rendition for the log, with obviously unsafe tokens quoted.
    pub fn describe(&self) -> String {
        let mut parts = vec![shell_quote(&self.java_binary.to_string_lossy())];
        parts.extend(self.jvm_args.iter().map(|a| shell_quote(a)));
        if !self.classpath.is_empty() {
            parts.push("-cp".into());
            parts.push(shell_quote(&self.classpath_string()));
        }
        parts.push(self.main_class.clone());
        parts.extend(self.game_args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Split the profile's argument template on whitespace and expand each
/// token. Tokens left with unresolved placeholders are kept: downstream
/// censoring/logging should show what was actually passed.
pub fn build_game_args(template: &str, variables: &HashMap<String, String>) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| expand_variables(token, variables))
        .collect()
}

fn shell_quote(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".into();
    }
    let safe = raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=' | '$' | '{' | '}')
    });
    if safe {
        raw.to_string()
    } else {
        format!("\"{}\"", raw.replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn template_tokens_expand_individually() {
        let args = build_game_args(
            "--username ${auth_player_name} --session ${auth_session}",
            &variables(&[("auth_player_name", "steve"), ("auth_session", "token123")]),
        );
        assert_eq!(args, vec!["--username", "steve", "--session", "token123"]);
    }

    #[test]
    fn unresolved_tokens_are_kept_verbatim() {
        let args = build_game_args(
            "--demo ${not_a_thing}",
            &variables(&[("auth_player_name", "steve")]),
        );
        assert_eq!(args, vec!["--demo", "${not_a_thing}"]);
    }

    #[test]
    fn describe_quotes_risky_tokens() {
        let mut command = GameCommand {
            java_binary: "/usr/bin/java".into(),
            jvm_args: vec!["-Xmx1024M".into()],
            classpath: vec!["/libs/a.jar".into()],
            main_class: "net.minecraft.client.Minecraft".into(),
            game_args: vec!["--username".into(), "two words".into()],
            working_dir: "/game".into(),
            env: HashMap::new(),
        };
        let line = command.describe();
        assert!(line.starts_with("/usr/bin/java -Xmx1024M -cp "));
        assert!(line.ends_with("--username \"two words\""));

        command.classpath.push("/libs/b.jar".into());
        assert_eq!(
            command.classpath_string(),
            format!("/libs/a.jar{}/libs/b.jar", classpath_separator())
        );
    }
}
