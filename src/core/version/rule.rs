// ─── Library Rules ───
// Ordered allow/disallow evaluation gating libraries by operating system.
//
// Rules are evaluated in document order; the last rule that applies wins,
// starting from an implicit Disallow. A library without any rules is
// handled by the caller (no rules means allowed).

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

/// Outcome of applying one rule: a verdict, or no effect because the rule's
/// condition did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Disallow,
    Defer,
}

/// One conditional clause attached to a library. Kept as a tagged variant
/// rather than an if/else chain so further rule kinds slot in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Applies on every system.
    Implicit { action: RuleAction },
    /// Applies only on the named OS. A version pattern may be present in
    /// manifests; it is carried but not matched (same as upstream
    /// launchers, which only ever dispatch on the name).
    Os {
        action: RuleAction,
        name: String,
        version: Option<String>,
    },
}

impl Rule {
    pub fn apply(&self, os: &str) -> Verdict {
        match self {
            Rule::Implicit { action } => action.verdict(),
            Rule::Os { action, name, .. } => {
                if name == os {
                    action.verdict()
                } else {
                    Verdict::Defer
                }
            }
        }
    }
}

impl RuleAction {
    fn verdict(self) -> Verdict {
        match self {
            RuleAction::Allow => Verdict::Allow,
            RuleAction::Disallow => Verdict::Disallow,
        }
    }
}

/// Fold the rule list for `os`: the last non-Defer verdict decides,
/// starting from Disallow.
pub fn evaluate(rules: &[Rule], os: &str) -> bool {
    let mut result = Verdict::Disallow;
    for rule in rules {
        match rule.apply(os) {
            Verdict::Defer => {}
            verdict => result = verdict,
        }
    }
    result == Verdict::Allow
}

// ── Manifest form ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RawRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<RawOsRule>,
}

#[derive(Debug, Deserialize)]
pub struct RawOsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl From<RawRule> for Rule {
    fn from(raw: RawRule) -> Self {
        match raw.os {
            Some(RawOsRule {
                name: Some(name),
                version,
            }) => Rule::Os {
                action: raw.action,
                name,
                version,
            },
            // a rule without an OS constraint applies universally
            _ => Rule::Implicit { action: raw.action },
        }
    }
}

/// The OS name used by version manifests for the running platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> Rule {
        Rule::Implicit {
            action: RuleAction::Allow,
        }
    }

    fn disallow_on(os: &str) -> Rule {
        Rule::Os {
            action: RuleAction::Disallow,
            name: os.into(),
            version: None,
        }
    }

    fn allow_on(os: &str) -> Rule {
        Rule::Os {
            action: RuleAction::Allow,
            name: os.into(),
            version: None,
        }
    }

    #[test]
    fn last_applicable_rule_wins() {
        // a later universal Allow overrides an earlier matching Disallow
        assert!(evaluate(&[disallow_on("linux"), allow()], "linux"));
        // a later matching Disallow overrides an earlier universal Allow
        assert!(!evaluate(&[allow(), disallow_on("linux")], "linux"));
    }

    #[test]
    fn non_matching_rules_defer() {
        // only the osx rule matches nothing on linux: implicit Disallow
        assert!(!evaluate(&[allow_on("osx")], "linux"));
        // deferred rules leave earlier verdicts standing
        assert!(evaluate(&[allow(), disallow_on("osx")], "linux"));
    }

    #[test]
    fn rules_present_but_none_applicable_means_disallow() {
        assert!(!evaluate(&[disallow_on("windows"), allow_on("osx")], "linux"));
    }

    #[test]
    fn manifest_rules_without_os_become_implicit() {
        let raw: Vec<RawRule> = serde_json::from_value(serde_json::json!([
            {"action": "allow"},
            {"action": "disallow", "os": {"name": "osx"}}
        ]))
        .unwrap();
        let rules: Vec<Rule> = raw.into_iter().map(Rule::from).collect();
        assert_eq!(
            rules[0],
            Rule::Implicit {
                action: RuleAction::Allow
            }
        );
        assert!(evaluate(&rules, "linux"));
        assert!(!evaluate(&rules, "osx"));
    }
}
