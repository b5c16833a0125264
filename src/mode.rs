use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;

/// A coarse default policy applied when no explicit rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask for everything that no rule allows.
    #[default]
    Default,
    /// Accept file edits (and reads) inside the working directory.
    AcceptEdits,
    /// Planning: reads inside the working directory are fine, nothing else.
    Plan,
    /// Allow everything that is not denied by a rule or protected.
    BypassPermissions,
}

impl PermissionMode {
    /// Returns whether this mode allows an action of `kind` on its own.
    ///
    /// `in_working_directory` tells whether the target path lies inside the
    /// working directory; it is ignored for commands.
    pub fn allows(self, kind: ActionKind, in_working_directory: bool) -> bool {
        match (self, kind) {
            (PermissionMode::BypassPermissions, _) => true,
            (PermissionMode::AcceptEdits, ActionKind::Read | ActionKind::Edit) => {
                in_working_directory
            }
            (PermissionMode::Plan, ActionKind::Read) => in_working_directory,
            _ => false,
        }
    }

    /// Returns the mode's settings-file spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "plan" => Ok(PermissionMode::Plan),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(format!("unknown permission mode `{other}`")),
        }
    }
}
