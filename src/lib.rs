//! Toolguard: a permission decision engine for gating agent tool use.
//!
//! Every file read, file edit or shell command an agent attempts is turned
//! into an [`Action`] and evaluated against a [`PermissionContext`] (a mode
//! plus project and global rules). The result is a [`PermissionDecision`]:
//! allow, deny, or ask the user, with a structured reason and, for asks,
//! rules the user could accept to avoid being asked again.
//!
//! # Example
//!
//! ```
//! use toolguard::{Action, ActionKind, PermissionContext, PermissionEvaluator, Rule, RuleScope};
//!
//! let context = PermissionContext::new("/project")
//!     .with_rule(RuleScope::Project, Rule::allow(ActionKind::Command, "git:*").unwrap())
//!     .with_rule(RuleScope::Project, Rule::deny(ActionKind::Command, "git push:*").unwrap());
//! let evaluator = PermissionEvaluator::new();
//!
//! assert!(evaluator.evaluate(&Action::command("git status"), &context).is_allow());
//! assert!(evaluator.evaluate(&Action::command("git push origin main"), &context).is_deny());
//!
//! // Chained commands are never allowed by a prefix rule.
//! let decision = evaluator.evaluate(&Action::command("git status; rm -rf /"), &context);
//! assert!(decision.is_ask());
//! assert_eq!(decision.rule_suggestions(), None);
//! ```

mod action;
mod command;
mod config;
mod context;
mod decision;
mod error;
mod evaluator;
mod mode;
mod paths;
mod pattern;
mod rules;
mod store;
mod suggest;
mod telemetry;

pub mod shell;

pub use action::{Action, ActionKind, CommandAction, FileAction, GenericAction, Resource};
pub use command::{CommandAnalysis, CommandAnalyzer, Operator, SafeForm};
pub use config::{ConfigStore, Settings, SettingsFiles, parse_rule_entry};
pub use context::PermissionContext;
pub use decision::{DecisionReason, PermissionBehavior, PermissionDecision};
pub use error::{ConfigError, ConfigResult, PatternError, SinkError};
pub use evaluator::{DEFAULT_PROTECTED_PATHS, PermissionEvaluator};
pub use mode::PermissionMode;
pub use pattern::{CommandPattern, PathPattern, Pattern};
pub use rules::{Rule, RuleBehavior, RuleLifetime, RuleScope, RuleSet};
pub use store::{MatchedRule, RuleStore};
pub use suggest::{RuleSuggestion, suggest_for_command, suggest_for_path};
pub use telemetry::{
    COMMAND_INJECTION_SIGNAL, DecisionEvent, DecisionSink, PREFIX_QUERY_FAILED_SIGNAL,
    SIMPLE_ECHO_SIGNAL, TracingSink,
};
