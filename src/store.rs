use std::path::{Path, PathBuf};

use crate::action::ActionKind;
use crate::context::PermissionContext;
use crate::paths;
use crate::pattern::Pattern;
use crate::rules::{Rule, RuleBehavior, RuleScope};

/// A rule that matched, with the scope it was found in.
#[derive(Debug, Clone, Copy)]
pub struct MatchedRule<'a> {
    pub rule: &'a Rule,
    pub scope: RuleScope,
}

/// Read-only lookup over the rules of a [`PermissionContext`].
///
/// Project rules are consulted before global rules, so a project rule wins
/// when both scopes match.
#[derive(Debug)]
pub struct RuleStore<'a> {
    context: &'a PermissionContext,
    base: PathBuf,
}

const SCOPE_ORDER: [RuleScope; 2] = [RuleScope::Project, RuleScope::Global];

impl<'a> RuleStore<'a> {
    pub fn new(context: &'a PermissionContext) -> Self {
        let working_directory = context.working_directory();
        let base = paths::resolve(&working_directory.to_string_lossy(), Path::new("/"))
            .unwrap_or_else(|| working_directory.to_path_buf());
        Self { context, base }
    }

    /// The resolved working directory relative patterns are anchored at.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Finds the first rule of `kind` and `behavior` matching `candidate`.
    pub fn find_rule(
        &self,
        kind: ActionKind,
        candidate: &str,
        behavior: RuleBehavior,
    ) -> Option<MatchedRule<'a>> {
        self.find_rule_where(kind, candidate, behavior, |_| true)
    }

    /// Like [`find_rule`](Self::find_rule), considering only rules accepted
    /// by `filter`.
    pub fn find_rule_where(
        &self,
        kind: ActionKind,
        candidate: &str,
        behavior: RuleBehavior,
        filter: impl Fn(&Rule) -> bool,
    ) -> Option<MatchedRule<'a>> {
        // File candidates are resolved once rather than per rule.
        let resolved = match kind {
            ActionKind::Read | ActionKind::Edit => Some(paths::resolve(candidate, &self.base)?),
            ActionKind::Command => None,
        };

        let context: &'a PermissionContext = self.context;
        for scope in SCOPE_ORDER {
            for rule in context.rules(scope).rules(kind, behavior) {
                if !filter(rule) {
                    continue;
                }
                let matched = match (rule.pattern(), &resolved) {
                    (Pattern::PathGlob(pattern), Some(path)) => pattern.matches_path(path, &self.base),
                    (pattern, _) => pattern.matches(candidate, &self.base),
                };
                if matched {
                    return Some(MatchedRule { rule, scope });
                }
            }
        }
        None
    }
}
