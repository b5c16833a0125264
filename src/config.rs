//! Loading permission rules from settings files.
//!
//! Settings are JSON documents with a `permissions` block:
//!
//! ```json
//! {
//!   "permissions": {
//!     "defaultMode": "acceptEdits",
//!     "allow": ["Read(src/**)", "Bash(git status:*)"],
//!     "deny": ["Read(/etc/**)"]
//!   }
//! }
//! ```
//!
//! Missing keys mean "no rules". Keys of the wrong type, malformed entries
//! and bad patterns are errors: a broken settings file must not silently
//! turn into an empty rule set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::action::ActionKind;
use crate::error::{ConfigError, ConfigResult};
use crate::mode::PermissionMode;
use crate::rules::{Rule, RuleBehavior, RuleSet};

/// Source of persisted rules. The engine only ever reads through it.
pub trait ConfigStore {
    fn global_rules(&self) -> ConfigResult<RuleSet>;

    fn project_rules(&self) -> ConfigResult<RuleSet>;

    /// The configured default mode, if any.
    fn default_mode(&self) -> ConfigResult<Option<PermissionMode>> {
        Ok(None)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    permissions: PermissionsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionsSection {
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
    #[serde(default)]
    default_mode: Option<PermissionMode>,
}

/// The permission-relevant content of one settings file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub rules: RuleSet,
    pub default_mode: Option<PermissionMode>,
}

impl Settings {
    /// Parses a settings document.
    ///
    /// Entries for tools the engine does not gate (e.g. `WebFetch(...)`) are
    /// skipped with a warning.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{ActionKind, RuleBehavior, Settings};
    ///
    /// let settings = Settings::from_json(r#"{"permissions": {"allow": ["Bash(npm test)"]}}"#).unwrap();
    /// assert_eq!(settings.rules.rules(ActionKind::Command, RuleBehavior::Allow).len(), 1);
    /// ```
    pub fn from_json(json: &str) -> ConfigResult<Settings> {
        let document: SettingsDocument = serde_json::from_str(json)?;
        let permissions = document.permissions;

        let mut rules = RuleSet::empty();
        let entries = permissions
            .deny
            .iter()
            .map(|entry| (entry, RuleBehavior::Deny))
            .chain(permissions.allow.iter().map(|entry| (entry, RuleBehavior::Allow)));
        for (entry, behavior) in entries {
            match parse_rule_entry(entry, behavior) {
                Ok(rule) => {
                    rules.add(rule);
                }
                Err(ConfigError::UnknownTool { tool, .. }) => {
                    warn!(entry = %entry, tool = %tool, "skipping rule for unknown tool");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Settings {
            rules,
            default_mode: permissions.default_mode,
        })
    }

    /// Reads a settings file. A missing file yields empty settings.
    pub fn load(path: &Path) -> ConfigResult<Settings> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "settings file not found");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Settings::from_json(&contents)
    }
}

/// Parses one settings entry such as `Read(src/**)`, `Bash(git:*)` or a bare
/// tool name like `Edit`.
///
/// A bare tool name matches every target of that tool.
pub fn parse_rule_entry(entry: &str, behavior: RuleBehavior) -> ConfigResult<Rule> {
    let trimmed = entry.trim();
    let (tool, pattern) = match trimmed.split_once('(') {
        Some((tool, rest)) => {
            let pattern = rest
                .strip_suffix(')')
                .ok_or_else(|| ConfigError::invalid_rule(entry, "missing closing parenthesis"))?;
            (tool.trim(), Some(pattern))
        }
        None => (trimmed, None),
    };

    if tool.is_empty() {
        return Err(ConfigError::invalid_rule(entry, "missing tool name"));
    }

    let kind = ActionKind::for_tool(tool).ok_or_else(|| ConfigError::UnknownTool {
        entry: entry.to_string(),
        tool: tool.to_string(),
    })?;

    let pattern = pattern.unwrap_or(match kind {
        ActionKind::Read | ActionKind::Edit => "**",
        ActionKind::Command => "*",
    });

    Rule::new(kind, pattern, behavior).map_err(|source| ConfigError::Pattern {
        entry: entry.to_string(),
        source,
    })
}

/// Settings files on disk: one global file and any number of project files,
/// later project files adding to earlier ones.
#[derive(Debug, Clone, Default)]
pub struct SettingsFiles {
    global: Option<PathBuf>,
    project: Vec<PathBuf>,
}

impl SettingsFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conventional locations: `~/.claude/settings.json` globally and
    /// `.claude/settings.json` plus `.claude/settings.local.json` in the
    /// working directory.
    pub fn discover(working_directory: &Path) -> Self {
        let project_dir = working_directory.join(".claude");
        Self {
            global: dirs::home_dir().map(|home| home.join(".claude").join("settings.json")),
            project: vec![
                project_dir.join("settings.json"),
                project_dir.join("settings.local.json"),
            ],
        }
    }

    pub fn with_global(mut self, path: impl Into<PathBuf>) -> Self {
        self.global = Some(path.into());
        self
    }

    pub fn with_project(mut self, path: impl Into<PathBuf>) -> Self {
        self.project.push(path.into());
        self
    }

    fn load_global(&self) -> ConfigResult<Settings> {
        match &self.global {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }

    fn load_project(&self) -> ConfigResult<Vec<Settings>> {
        self.project.iter().map(|path| Settings::load(path)).collect()
    }
}

impl ConfigStore for SettingsFiles {
    fn global_rules(&self) -> ConfigResult<RuleSet> {
        Ok(self.load_global()?.rules)
    }

    fn project_rules(&self) -> ConfigResult<RuleSet> {
        let mut rules = RuleSet::empty();
        for settings in self.load_project()? {
            for rule in settings.rules.iter() {
                rules.add(rule.clone());
            }
        }
        Ok(rules)
    }

    /// The last project file that sets a mode wins, then the global file.
    fn default_mode(&self) -> ConfigResult<Option<PermissionMode>> {
        let project = self
            .load_project()?
            .into_iter()
            .rev()
            .find_map(|settings| settings.default_mode);
        match project {
            Some(mode) => Ok(Some(mode)),
            None => Ok(self.load_global()?.default_mode),
        }
    }
}
