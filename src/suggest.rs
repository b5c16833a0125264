//! Rule suggestions offered alongside `Ask` decisions.
//!
//! Suggestions are plain values. Nothing here touches a [`RuleSet`]; a
//! caller commits a suggestion with [`RuleSuggestion::apply`] once the user
//! accepts it.
//!
//! [`RuleSet`]: crate::RuleSet

use std::path::Path;

use serde::Serialize;

use crate::action::ActionKind;
use crate::command::CommandAnalysis;
use crate::context::PermissionContext;
use crate::pattern::{CommandPattern, Pattern};
use crate::rules::{Rule, RuleBehavior, RuleScope};

/// A candidate rule the user may accept to avoid future prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSuggestion {
    pub kind: ActionKind,
    pub pattern: Pattern,
    pub behavior: RuleBehavior,
    pub scope: RuleScope,
}

impl RuleSuggestion {
    fn allow(kind: ActionKind, pattern: Pattern) -> Self {
        Self {
            kind,
            pattern,
            behavior: RuleBehavior::Allow,
            scope: RuleScope::Project,
        }
    }

    /// The rule this suggestion would create.
    pub fn to_rule(&self) -> Rule {
        Rule::from_pattern(self.kind, self.pattern.clone(), self.behavior)
    }

    /// Returns a new context with the suggested rule granted.
    pub fn apply(&self, context: &PermissionContext) -> PermissionContext {
        context.with_rule(self.scope, self.to_rule())
    }
}

/// Suggests rules for a command.
///
/// The prefix wildcard comes first as the preferred choice, followed by the
/// exact command. Without a prefix only the exact command is offered.
///
/// ```
/// use toolguard::{suggest_for_command, CommandAnalyzer};
///
/// let analysis = CommandAnalyzer::default().analyze("git status");
/// let patterns: Vec<_> = suggest_for_command(&analysis)
///     .iter()
///     .map(|s| s.pattern.to_string())
///     .collect();
/// assert_eq!(patterns, vec!["git status *", "git status"]);
/// ```
pub fn suggest_for_command(analysis: &CommandAnalysis) -> Vec<RuleSuggestion> {
    let mut patterns = Vec::new();
    if let Some(prefix) = &analysis.normalized_prefix {
        if let Ok(pattern) = CommandPattern::prefix(prefix) {
            patterns.push(pattern);
        }
    }
    if let Ok(exact) = CommandPattern::parse(&analysis.command) {
        if !exact.is_prefix() {
            patterns.push(exact);
        }
    }

    let mut suggestions: Vec<RuleSuggestion> = Vec::new();
    for pattern in patterns {
        let suggestion = RuleSuggestion::allow(ActionKind::Command, Pattern::CommandPrefix(pattern));
        if !suggestions.iter().any(|s| s.pattern.as_str() == suggestion.pattern.as_str()) {
            suggestions.push(suggestion);
        }
    }
    suggestions
}

/// Suggests rules for a file path.
///
/// Inside the working directory the exact relative path is offered, then
/// its parent directory tree. Outside it only the exact absolute path is
/// offered.
pub fn suggest_for_path(kind: ActionKind, path: &Path, working_directory: &Path) -> Vec<RuleSuggestion> {
    let mut candidates = Vec::new();
    match path.strip_prefix(working_directory) {
        Ok(relative) if !relative.as_os_str().is_empty() => {
            candidates.push(relative.to_string_lossy().into_owned());
            if let Some(parent) = relative.parent().filter(|p| !p.as_os_str().is_empty()) {
                candidates.push(format!("{}/**", parent.to_string_lossy()));
            }
        }
        Ok(_) => candidates.push("**".to_string()),
        Err(_) => candidates.push(path.to_string_lossy().into_owned()),
    }

    candidates
        .iter()
        .filter_map(|candidate| Pattern::parse(kind, &escape_glob(candidate)).ok())
        .map(|pattern| RuleSuggestion::allow(kind, pattern))
        .collect()
}

/// Escapes glob metacharacters in a literal path, keeping a trailing `/**`.
fn escape_glob(candidate: &str) -> String {
    match candidate.strip_suffix("/**") {
        Some(dir) if paths_need_escape(dir) => format!("{}/**", glob::Pattern::escape(dir)),
        Some(_) => candidate.to_string(),
        None if candidate == "**" => candidate.to_string(),
        None if paths_need_escape(candidate) => glob::Pattern::escape(candidate),
        None => candidate.to_string(),
    }
}

fn paths_need_escape(s: &str) -> bool {
    s.contains(['*', '?', '['])
}
