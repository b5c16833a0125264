use std::fmt;
use std::path::{Path, PathBuf};

use glob::MatchOptions;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::action::ActionKind;
use crate::error::PatternError;
use crate::paths;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A rule pattern: a path glob for file actions or a command prefix for
/// shell commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Matches resolved filesystem paths.
    PathGlob(PathPattern),
    /// Matches shell commands by exact text or leading words.
    CommandPrefix(CommandPattern),
}

impl Pattern {
    /// Parses a pattern for the given action kind.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::{ActionKind, Pattern};
    ///
    /// let pattern = Pattern::parse(ActionKind::Command, "git:*").unwrap();
    /// assert!(pattern.matches("git status", std::path::Path::new("/")));
    /// assert!(!pattern.matches("gitk", std::path::Path::new("/")));
    /// ```
    pub fn parse(kind: ActionKind, pattern: &str) -> Result<Self, PatternError> {
        match kind {
            ActionKind::Read | ActionKind::Edit => PathPattern::parse(pattern).map(Pattern::PathGlob),
            ActionKind::Command => CommandPattern::parse(pattern).map(Pattern::CommandPrefix),
        }
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::PathGlob(p) => p.as_str(),
            Pattern::CommandPrefix(p) => p.as_str(),
        }
    }

    /// Tests a candidate path or command against this pattern.
    ///
    /// Relative paths (in the candidate and in the pattern) are anchored at
    /// `base`. A candidate that cannot be resolved never matches.
    pub fn matches(&self, candidate: &str, base: &Path) -> bool {
        match self {
            Pattern::PathGlob(pattern) => match paths::resolve(candidate, base) {
                Some(resolved) => pattern.matches_path(&resolved, base),
                None => {
                    warn!(candidate, pattern = pattern.as_str(), "unresolvable path never matches");
                    false
                }
            },
            Pattern::CommandPrefix(pattern) => pattern.matches(candidate),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathShape {
    /// A single path.
    Exact,
    /// `dir/**`: the directory and everything beneath it.
    Tree { dir: String },
    /// Any other glob; `*` stays within one path segment.
    Glob,
}

/// A filesystem path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    shape: PathShape,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let raw = pattern.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let shape = if raw == "**" {
            PathShape::Tree { dir: ".".into() }
        } else if let Some(dir) = raw.strip_suffix("/**").filter(|dir| !has_glob_meta(dir)) {
            PathShape::Tree {
                dir: if dir.is_empty() { "/".into() } else { dir.into() },
            }
        } else if has_glob_meta(raw) {
            glob::Pattern::new(raw).map_err(|e| PatternError::InvalidGlob {
                pattern: raw.to_string(),
                message: e.msg.to_string(),
            })?;
            PathShape::Glob
        } else {
            PathShape::Exact
        };

        Ok(Self {
            raw: raw.to_string(),
            shape,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Tests an already-resolved absolute path.
    pub fn matches_path(&self, candidate: &Path, base: &Path) -> bool {
        match &self.shape {
            PathShape::Exact => {
                paths::resolve(&self.raw, base).is_some_and(|target| target == candidate)
            }
            PathShape::Tree { dir } => {
                paths::resolve(dir, base).is_some_and(|dir| paths::is_within(candidate, &dir))
            }
            PathShape::Glob => match self.anchored_glob(base) {
                Some(glob) => glob.matches_path_with(candidate, GLOB_OPTIONS),
                None => {
                    warn!(pattern = %self.raw, "path glob could not be anchored; treating as non-matching");
                    false
                }
            },
        }
    }

    /// Resolves the literal leading components of the glob and re-attaches
    /// the wildcard tail.
    fn anchored_glob(&self, base: &Path) -> Option<glob::Pattern> {
        let mut literal = Vec::new();
        let mut rest = Vec::new();
        for segment in self.raw.split('/') {
            if rest.is_empty() && !has_glob_meta(segment) {
                literal.push(segment);
            } else {
                rest.push(segment);
            }
        }

        let prefix = match literal.join("/") {
            joined if joined.is_empty() && self.raw.starts_with('/') => PathBuf::from("/"),
            joined if joined.is_empty() => paths::resolve(".", base)?,
            joined => paths::resolve(&joined, base)?,
        };

        let mut anchored = glob::Pattern::escape(&prefix.to_string_lossy());
        if !anchored.ends_with('/') {
            anchored.push('/');
        }
        anchored.push_str(&rest.join("/"));
        glob::Pattern::new(&anchored).ok()
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// A shell command pattern.
///
/// `git status` matches exactly that command. `git *` and `git:*` match any
/// command whose leading words are `git`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPattern {
    raw: String,
    words: Vec<String>,
    prefix: bool,
}

impl CommandPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let raw = pattern.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let (body, prefix) = if raw == "*" {
            ("", true)
        } else if let Some(body) = raw.strip_suffix(":*").or_else(|| raw.strip_suffix(" *")) {
            (body, true)
        } else {
            (raw, false)
        };

        let words: Vec<String> = body.split_whitespace().map(String::from).collect();
        if words.is_empty() && raw != "*" {
            return Err(PatternError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            words,
            prefix,
        })
    }

    /// Creates a prefix pattern (`<prefix> *`).
    pub fn prefix(prefix: &str) -> Result<Self, PatternError> {
        Self::parse(&format!("{} *", prefix.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` for word-prefix patterns, `false` for exact ones.
    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// Tests a command line, comparing whitespace-separated words.
    pub fn matches(&self, command: &str) -> bool {
        let words: Vec<&str> = command.split_whitespace().collect();
        if self.prefix {
            words.len() >= self.words.len()
                && self.words.iter().zip(&words).all(|(expected, actual)| expected == actual)
        } else {
            words.len() == self.words.len()
                && self.words.iter().zip(&words).all(|(expected, actual)| expected == actual)
        }
    }
}
