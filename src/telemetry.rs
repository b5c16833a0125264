//! Decision telemetry.
//!
//! The evaluator reports every decision to an optional [`DecisionSink`].
//! Reporting is fire-and-forget: a failing sink is logged and never changes
//! the decision.

use tracing::info;

use crate::action::ActionKind;
use crate::decision::PermissionDecision;
use crate::error::SinkError;

/// A bare `echo` with no metacharacters was seen. Low risk, still asked.
pub const SIMPLE_ECHO_SIGNAL: &str = "bash_tool_simple_echo";
/// A command chained or substituted other commands.
pub const COMMAND_INJECTION_SIGNAL: &str = "bash_tool_command_injection";
/// No usable command prefix could be computed.
pub const PREFIX_QUERY_FAILED_SIGNAL: &str = "bash_tool_prefix_query_failed";

/// One evaluated action and its outcome.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEvent<'a> {
    /// The action's human-readable description.
    pub description: &'a str,
    pub kind: Option<ActionKind>,
    pub decision: &'a PermissionDecision,
    /// Named low-level observations made while deciding.
    pub signals: &'a [&'static str],
}

/// Receives decision events.
pub trait DecisionSink: Send + Sync {
    fn log_decision(&self, event: &DecisionEvent<'_>) -> Result<(), SinkError>;
}

/// Emits each decision as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn log_decision(&self, event: &DecisionEvent<'_>) -> Result<(), SinkError> {
        info!(
            target: "toolguard::decision",
            action = event.description,
            kind = event.kind.map(ActionKind::as_str),
            behavior = %event.decision.behavior(),
            signals = ?event.signals,
            "permission decision"
        );
        Ok(())
    }
}
