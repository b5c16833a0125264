use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::{Value, json};

use crate::action::ActionKind;
use crate::error::PatternError;
use crate::pattern::Pattern;

/// What a rule does when its pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBehavior {
    Allow,
    Deny,
}

/// How long a rule lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLifetime {
    /// Kept until explicitly removed; written back to settings.
    #[default]
    Persistent,
    /// Discarded when the session ends; never written to settings.
    Session,
}

/// Where a rule is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// The per-project settings. Consulted first.
    Project,
    /// The user's global settings.
    Global,
}

/// A rule pairs a pattern with a behavior (allow or deny) for one action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    kind: ActionKind,
    pattern: Pattern,
    behavior: RuleBehavior,
    lifetime: RuleLifetime,
}

impl Rule {
    /// Creates a persistent rule, parsing `pattern` for `kind`.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{ActionKind, Rule, RuleBehavior};
    ///
    /// let rule = Rule::new(ActionKind::Command, "git:*", RuleBehavior::Allow).unwrap();
    /// assert_eq!(rule.to_string(), "Bash(git:*)");
    /// ```
    pub fn new(kind: ActionKind, pattern: &str, behavior: RuleBehavior) -> Result<Self, PatternError> {
        Ok(Self {
            kind,
            pattern: Pattern::parse(kind, pattern)?,
            behavior,
            lifetime: RuleLifetime::Persistent,
        })
    }

    /// Creates an allow rule.
    pub fn allow(kind: ActionKind, pattern: &str) -> Result<Self, PatternError> {
        Self::new(kind, pattern, RuleBehavior::Allow)
    }

    /// Creates a deny rule.
    pub fn deny(kind: ActionKind, pattern: &str) -> Result<Self, PatternError> {
        Self::new(kind, pattern, RuleBehavior::Deny)
    }

    /// Creates a rule from an already-parsed pattern.
    pub fn from_pattern(kind: ActionKind, pattern: Pattern, behavior: RuleBehavior) -> Self {
        Self {
            kind,
            pattern,
            behavior,
            lifetime: RuleLifetime::Persistent,
        }
    }

    /// Marks this rule as session-scoped.
    pub fn for_session(mut self) -> Self {
        self.lifetime = RuleLifetime::Session;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn behavior(&self) -> RuleBehavior {
        self.behavior
    }

    pub fn lifetime(&self) -> RuleLifetime {
        self.lifetime
    }

    /// Tests a candidate path or command against this rule's pattern.
    pub fn matches(&self, candidate: &str, base: &Path) -> bool {
        self.pattern.matches(candidate, base)
    }

    fn same_rule(&self, other: &Rule) -> bool {
        self.kind == other.kind
            && self.behavior == other.behavior
            && self.pattern.as_str() == other.pattern.as_str()
    }
}

/// Renders the rule as a settings entry, e.g. `Read(src/**)` or `Bash(git:*)`.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tool = match self.kind {
            ActionKind::Read => "Read",
            ActionKind::Edit => "Edit",
            ActionKind::Command => "Bash",
        };
        write!(f, "{}({})", tool, self.pattern)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct KindRules {
    allow: Vec<Rule>,
    deny: Vec<Rule>,
}

impl KindRules {
    fn list(&self, behavior: RuleBehavior) -> &Vec<Rule> {
        match behavior {
            RuleBehavior::Allow => &self.allow,
            RuleBehavior::Deny => &self.deny,
        }
    }

    fn list_mut(&mut self, behavior: RuleBehavior) -> &mut Vec<Rule> {
        match behavior {
            RuleBehavior::Allow => &mut self.allow,
            RuleBehavior::Deny => &mut self.deny,
        }
    }
}

/// Allow and deny rules for each action kind within one scope.
///
/// Within a kind, rules keep insertion order; deny rules are always consulted
/// before allow rules by the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    read: KindRules,
    edit: KindRules,
    command: KindRules,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a rule set from a list of rules.
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut set = Self::empty();
        for rule in rules {
            set.add(rule);
        }
        set
    }

    fn kind_rules(&self, kind: ActionKind) -> &KindRules {
        match kind {
            ActionKind::Read => &self.read,
            ActionKind::Edit => &self.edit,
            ActionKind::Command => &self.command,
        }
    }

    fn kind_rules_mut(&mut self, kind: ActionKind) -> &mut KindRules {
        match kind {
            ActionKind::Read => &mut self.read,
            ActionKind::Edit => &mut self.edit,
            ActionKind::Command => &mut self.command,
        }
    }

    /// Adds a rule. Returns `false` if an identical rule was already present.
    pub fn add(&mut self, rule: Rule) -> bool {
        let list = self.kind_rules_mut(rule.kind).list_mut(rule.behavior);
        if list.iter().any(|existing| existing.same_rule(&rule)) {
            return false;
        }
        list.push(rule);
        true
    }

    /// Removes a rule. Returns `true` if it was present.
    pub fn remove(&mut self, rule: &Rule) -> bool {
        let list = self.kind_rules_mut(rule.kind).list_mut(rule.behavior);
        let before = list.len();
        list.retain(|existing| !existing.same_rule(rule));
        list.len() != before
    }

    /// Returns the rules for a kind and behavior, in order.
    pub fn rules(&self, kind: ActionKind, behavior: RuleBehavior) -> &[Rule] {
        self.kind_rules(kind).list(behavior)
    }

    /// Iterates over every rule, kind by kind, deny rules first.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        ActionKind::ALL.into_iter().flat_map(move |kind| {
            let rules = self.kind_rules(kind);
            rules.deny.iter().chain(rules.allow.iter())
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns a copy without session-scoped rules.
    pub fn persistent(&self) -> RuleSet {
        RuleSet::new(
            self.iter()
                .filter(|rule| rule.lifetime == RuleLifetime::Persistent)
                .cloned(),
        )
    }

    /// Renders the persistent rules as a settings `permissions` block.
    ///
    /// The caller decides whether and where to write it.
    pub fn to_settings_json(&self) -> Value {
        let entries = |behavior: RuleBehavior| -> Vec<String> {
            self.iter()
                .filter(|rule| rule.behavior == behavior && rule.lifetime == RuleLifetime::Persistent)
                .map(|rule| rule.to_string())
                .collect()
        };
        json!({
            "permissions": {
                "allow": entries(RuleBehavior::Allow),
                "deny": entries(RuleBehavior::Deny),
            }
        })
    }
}
