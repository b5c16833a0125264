use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The kind of access an action needs; rules are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Reading files or listing directories.
    Read,
    /// Creating or modifying files.
    Edit,
    /// Running shell commands.
    Command,
}

impl ActionKind {
    /// All action kinds, in rule-file order.
    pub const ALL: [ActionKind; 3] = [ActionKind::Read, ActionKind::Edit, ActionKind::Command];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Read => "read",
            ActionKind::Edit => "edit",
            ActionKind::Command => "command",
        }
    }

    /// Maps an agent tool name onto the action kind its rules live under.
    pub fn for_tool(tool_name: &str) -> Option<ActionKind> {
        match tool_name {
            "Read" | "Glob" | "Grep" | "LS" => Some(ActionKind::Read),
            "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => Some(ActionKind::Edit),
            "Bash" => Some(ActionKind::Command),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the engine can compute a permission target for.
///
/// Each tool type implements this so the evaluator never needs to know the
/// shape of tool-specific input.
pub trait Resource {
    /// The path (for file actions) or command line (for commands) under
    /// evaluation, or `None` when the input does not name one.
    fn path(&self) -> Option<String>;

    /// A short human-readable description used in messages and logs.
    fn describe(&self) -> String;
}

/// An action represents a single attempted tool use by an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Reading a file or directory.
    Read(FileAction),
    /// Modifying a file.
    Edit(FileAction),
    /// Running a shell command.
    Command(CommandAction),
    /// A tool whose input schema the engine does not know.
    Generic(GenericAction),
}

impl Action {
    /// Creates a read action for a path.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{Action, ActionKind};
    ///
    /// let action = Action::read("src/main.rs");
    /// assert_eq!(action.kind(), Some(ActionKind::Read));
    /// ```
    pub fn read(path: impl Into<String>) -> Self {
        Action::Read(FileAction::new(path))
    }

    /// Creates an edit action for a path.
    pub fn edit(path: impl Into<String>) -> Self {
        Action::Edit(FileAction::new(path))
    }

    /// Creates a command action from a shell command string.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{Action, Resource};
    ///
    /// let action = Action::command("git status");
    /// assert_eq!(action.path().as_deref(), Some("git status"));
    /// ```
    pub fn command(command: impl Into<String>) -> Self {
        Action::Command(CommandAction::new(command))
    }

    /// Builds an action from an agent tool call.
    ///
    /// Known tools are mapped onto typed actions; anything else becomes an
    /// opaque [`GenericAction`], which always needs confirmation.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use toolguard::{Action, ActionKind, Resource};
    ///
    /// let action = Action::from_tool_input("Write", json!({"file_path": "notes.md", "content": "hi"}));
    /// assert_eq!(action.kind(), Some(ActionKind::Edit));
    /// assert_eq!(action.path().as_deref(), Some("notes.md"));
    /// ```
    pub fn from_tool_input(tool_name: &str, input: Value) -> Self {
        match tool_name {
            "Read" => Action::Read(FileAction::from_input(&input, &["file_path"], None)),
            // Search tools default to the working directory.
            "Glob" | "Grep" | "LS" => Action::Read(FileAction::from_input(&input, &["path"], Some("."))),
            "Edit" | "Write" | "MultiEdit" => {
                Action::Edit(FileAction::from_input(&input, &["file_path"], None))
            }
            "NotebookEdit" => Action::Edit(FileAction::from_input(&input, &["notebook_path"], None)),
            "Bash" => {
                let command = ["command", "cmd", "script"]
                    .iter()
                    .find_map(|field| extract_string_field(&input, field))
                    .or_else(|| input.as_str().map(String::from))
                    .unwrap_or_default();
                Action::Command(CommandAction { command, input })
            }
            other => Action::Generic(GenericAction::new(other, None, input)),
        }
    }

    /// Returns the action kind rules are looked up under, if any.
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Action::Read(_) => Some(ActionKind::Read),
            Action::Edit(_) => Some(ActionKind::Edit),
            Action::Command(_) => Some(ActionKind::Command),
            Action::Generic(generic) => generic.kind,
        }
    }

    /// Returns the tool input carried by this action.
    pub fn input(&self) -> &Value {
        match self {
            Action::Read(file) | Action::Edit(file) => &file.input,
            Action::Command(command) => &command.input,
            Action::Generic(generic) => &generic.input,
        }
    }
}

impl Resource for Action {
    fn path(&self) -> Option<String> {
        match self {
            Action::Read(file) | Action::Edit(file) => file.path(),
            Action::Command(command) => command.path(),
            Action::Generic(generic) => generic.path(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Action::Read(file) => format!("read {}", file.describe()),
            Action::Edit(file) => format!("edit {}", file.describe()),
            Action::Command(command) => command.describe(),
            Action::Generic(generic) => generic.describe(),
        }
    }
}

/// A read or edit of a single path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAction {
    path: Option<String>,
    input: Value,
}

impl FileAction {
    /// Creates a file action targeting `path`.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let input = json!({ "file_path": path });
        Self {
            path: Some(path),
            input,
        }
    }

    fn from_input(input: &Value, fields: &[&str], fallback: Option<&str>) -> Self {
        let path = fields
            .iter()
            .find_map(|field| extract_string_field(input, field))
            .or_else(|| fallback.map(String::from));
        Self {
            path,
            input: input.clone(),
        }
    }
}

impl Resource for FileAction {
    fn path(&self) -> Option<String> {
        self.path.clone()
    }

    fn describe(&self) -> String {
        self.path.clone().unwrap_or_else(|| "<no path>".to_string())
    }
}

/// A shell command to be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAction {
    command: String,
    input: Value,
}

impl CommandAction {
    /// Creates a command action from a shell command string.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let input = json!({ "command": command });
        Self { command, input }
    }

    /// Returns the raw command string.
    pub fn raw(&self) -> &str {
        &self.command
    }
}

impl Resource for CommandAction {
    fn path(&self) -> Option<String> {
        Some(self.command.clone())
    }

    fn describe(&self) -> String {
        format!("run `{}`", self.command)
    }
}

/// A tool call the engine has no schema for.
///
/// When constructed with a kind, the target path is taken from the usual
/// path-like input fields. Without a kind the action has no target and is
/// never decided automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericAction {
    tool_name: String,
    kind: Option<ActionKind>,
    input: Value,
}

impl GenericAction {
    pub fn new(tool_name: impl Into<String>, kind: Option<ActionKind>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            kind,
            input,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
}

impl Resource for GenericAction {
    fn path(&self) -> Option<String> {
        match self.kind? {
            ActionKind::Command => ["command", "cmd", "script"]
                .iter()
                .find_map(|field| extract_string_field(&self.input, field)),
            ActionKind::Read | ActionKind::Edit => ["file_path", "path", "file", "filename"]
                .iter()
                .find_map(|field| extract_string_field(&self.input, field)),
        }
    }

    fn describe(&self) -> String {
        format!("use {}", self.tool_name)
    }
}

/// Extracts a string field from a JSON object.
fn extract_string_field(input: &Value, field: &str) -> Option<String> {
    input
        .as_object()?
        .get(field)?
        .as_str()
        .map(|s: &str| s.to_string())
}
