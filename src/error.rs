//! Error types.
//!
//! Permission outcomes (allow, deny, ask) are never errors. These types cover
//! malformed rule patterns, unreadable or invalid settings, and decision sinks
//! that fail to record an event.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while parsing a rule pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string was empty or only whitespace.
    #[error("pattern must not be empty")]
    Empty,

    /// The path glob could not be compiled.
    #[error("invalid glob `{pattern}`: {message}")]
    InvalidGlob { pattern: String, message: String },
}

/// Errors produced while loading permission settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid JSON or has the wrong shape
    /// (for example `permissions.allow` is not an array of strings).
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule entry such as `Bash(git:*)` could not be understood.
    #[error("invalid permission rule `{entry}`: {reason}")]
    InvalidRule { entry: String, reason: String },

    /// A rule entry named a tool the engine has no action kind for.
    #[error("unknown tool `{tool}` in permission rule `{entry}`")]
    UnknownTool { entry: String, tool: String },

    /// The pattern inside a rule entry was rejected.
    #[error("invalid pattern in permission rule `{entry}`: {source}")]
    Pattern {
        entry: String,
        #[source]
        source: PatternError,
    },
}

impl ConfigError {
    pub(crate) fn invalid_rule(entry: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidRule {
            entry: entry.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error reported by a [`DecisionSink`](crate::DecisionSink).
///
/// Sink failures are logged and otherwise ignored by the evaluator.
#[derive(Error, Debug)]
#[error("decision sink failed: {0}")]
pub struct SinkError(pub String);

/// Result type alias for settings loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
