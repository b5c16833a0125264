use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::mode::PermissionMode;
use crate::rules::{Rule, RuleScope};
use crate::suggest::RuleSuggestion;

/// The three terminal outcomes of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionBehavior {
    /// The action may proceed.
    Allow,
    /// The action is forbidden.
    Deny,
    /// No rule or mode decided; the user must confirm.
    Ask,
}

impl PermissionBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionBehavior::Allow => "allow",
            PermissionBehavior::Deny => "deny",
            PermissionBehavior::Ask => "ask",
        }
    }
}

impl fmt::Display for PermissionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DecisionReason {
    /// A rule matched.
    Rule { rule: Rule, scope: RuleScope },
    /// The permission mode decided.
    Mode { mode: PermissionMode },
    /// Anything else, described in prose.
    Other { reason: String },
    /// A compound command was split and each part evaluated on its own.
    SubcommandResults {
        reasons: IndexMap<String, PermissionDecision>,
    },
}

impl DecisionReason {
    pub(crate) fn other(reason: impl Into<String>) -> Self {
        DecisionReason::Other {
            reason: reason.into(),
        }
    }
}

/// The result of evaluating an action.
///
/// Serializes with a `behavior` tag, e.g.
/// `{"behavior":"deny","message":"...","decisionReason":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "behavior", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PermissionDecision {
    Allow {
        updated_input: Value,
        decision_reason: DecisionReason,
    },
    Deny {
        message: String,
        decision_reason: DecisionReason,
    },
    Ask {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        decision_reason: Option<DecisionReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_suggestions: Option<Vec<RuleSuggestion>>,
    },
}

impl PermissionDecision {
    pub fn behavior(&self) -> PermissionBehavior {
        match self {
            PermissionDecision::Allow { .. } => PermissionBehavior::Allow,
            PermissionDecision::Deny { .. } => PermissionBehavior::Deny,
            PermissionDecision::Ask { .. } => PermissionBehavior::Ask,
        }
    }

    /// The human-readable message; `Allow` carries none.
    pub fn message(&self) -> Option<&str> {
        match self {
            PermissionDecision::Allow { .. } => None,
            PermissionDecision::Deny { message, .. } | PermissionDecision::Ask { message, .. } => {
                Some(message)
            }
        }
    }

    pub fn decision_reason(&self) -> Option<&DecisionReason> {
        match self {
            PermissionDecision::Allow { decision_reason, .. }
            | PermissionDecision::Deny { decision_reason, .. } => Some(decision_reason),
            PermissionDecision::Ask { decision_reason, .. } => decision_reason.as_ref(),
        }
    }

    /// Suggested rules. Always `None` for `Deny`.
    pub fn rule_suggestions(&self) -> Option<&[RuleSuggestion]> {
        match self {
            PermissionDecision::Ask {
                rule_suggestions, ..
            } => rule_suggestions.as_deref(),
            _ => None,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.behavior() == PermissionBehavior::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.behavior() == PermissionBehavior::Deny
    }

    pub fn is_ask(&self) -> bool {
        self.behavior() == PermissionBehavior::Ask
    }

    pub(crate) fn allow(updated_input: Value, decision_reason: DecisionReason) -> Self {
        PermissionDecision::Allow {
            updated_input,
            decision_reason,
        }
    }

    pub(crate) fn deny(description: &str, decision_reason: DecisionReason) -> Self {
        PermissionDecision::Deny {
            message: format!("Permission to {description} has been denied."),
            decision_reason,
        }
    }

    /// The "requested permission, not yet granted" prompt.
    pub(crate) fn ask(
        description: &str,
        decision_reason: Option<DecisionReason>,
        suggestions: Vec<RuleSuggestion>,
    ) -> Self {
        Self::ask_with_message(
            format!("The agent requested permission to {description}, but it has not been granted yet."),
            decision_reason,
            suggestions,
        )
    }

    pub(crate) fn ask_with_message(
        message: String,
        decision_reason: Option<DecisionReason>,
        suggestions: Vec<RuleSuggestion>,
    ) -> Self {
        PermissionDecision::Ask {
            message,
            decision_reason,
            rule_suggestions: (!suggestions.is_empty()).then_some(suggestions),
        }
    }
}
