use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::error::ConfigResult;
use crate::mode::PermissionMode;
use crate::rules::{Rule, RuleScope, RuleSet};

/// An immutable snapshot of everything an evaluation depends on.
///
/// Contexts are cheap to clone and safe to share between threads. Granting or
/// revoking a rule produces a new context; evaluations already holding the
/// old snapshot are unaffected.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionContext {
    mode: PermissionMode,
    working_directory: PathBuf,
    project_rules: Arc<RuleSet>,
    global_rules: Arc<RuleSet>,
}

impl PermissionContext {
    /// Creates a context in default mode with no rules.
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            mode: PermissionMode::Default,
            working_directory: working_directory.into(),
            project_rules: Arc::new(RuleSet::empty()),
            global_rules: Arc::new(RuleSet::empty()),
        }
    }

    /// Loads rules and the default mode from a config store.
    ///
    /// Configuration errors are returned rather than degraded into an empty
    /// rule set.
    pub fn load(store: &dyn ConfigStore, working_directory: impl Into<PathBuf>) -> ConfigResult<Self> {
        let mode = store.default_mode()?.unwrap_or_default();
        Ok(Self::new(working_directory)
            .with_mode(mode)
            .with_global_rules(store.global_rules()?)
            .with_project_rules(store.project_rules()?))
    }

    pub fn with_mode(mut self, mode: PermissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_project_rules(mut self, rules: RuleSet) -> Self {
        self.project_rules = Arc::new(rules);
        self
    }

    pub fn with_global_rules(mut self, rules: RuleSet) -> Self {
        self.global_rules = Arc::new(rules);
        self
    }

    /// Returns a new context with `rule` added to `scope`.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{ActionKind, PermissionContext, Rule, RuleScope};
    ///
    /// let before = PermissionContext::new("/project");
    /// let after = before.with_rule(RuleScope::Project, Rule::allow(ActionKind::Command, "git:*").unwrap());
    /// assert!(before.rules(RuleScope::Project).is_empty());
    /// assert_eq!(after.rules(RuleScope::Project).len(), 1);
    /// ```
    pub fn with_rule(&self, scope: RuleScope, rule: Rule) -> Self {
        let mut rules = self.rules(scope).clone();
        rules.add(rule);
        self.replace(scope, rules)
    }

    /// Returns a new context with `rule` removed from `scope`.
    pub fn without_rule(&self, scope: RuleScope, rule: &Rule) -> Self {
        let mut rules = self.rules(scope).clone();
        rules.remove(rule);
        self.replace(scope, rules)
    }

    /// Returns a new context with every session-scoped rule dropped.
    pub fn without_session_rules(&self) -> Self {
        let mut next = self.clone();
        next.project_rules = Arc::new(self.project_rules.persistent());
        next.global_rules = Arc::new(self.global_rules.persistent());
        next
    }

    fn replace(&self, scope: RuleScope, rules: RuleSet) -> Self {
        let mut next = self.clone();
        match scope {
            RuleScope::Project => next.project_rules = Arc::new(rules),
            RuleScope::Global => next.global_rules = Arc::new(rules),
        }
        next
    }

    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Returns the rules stored in `scope`.
    pub fn rules(&self, scope: RuleScope) -> &RuleSet {
        match scope {
            RuleScope::Project => &self.project_rules,
            RuleScope::Global => &self.global_rules,
        }
    }
}
