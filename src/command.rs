//! Static analysis of shell command lines.
//!
//! The analyzer never executes anything. It scans a command with a small
//! quote-aware lexer to find the operators that separate commands, computes
//! the prefix used for rule matching, and flags command lines that chain or
//! substitute commands.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Tools whose first argument is a subcommand that belongs in the prefix.
const MULTI_WORD_TOOLS: &[&str] = &[
    "git", "npm", "cargo", "docker", "kubectl", "go", "yarn", "pnpm", "pip", "gh", "bun",
];

static SIMPLE_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^echo([ \t]+[\w \t.,:/=+@%-]*)?$").expect("static regex"));

/// An operator separating two commands on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `;`
    Semicolon,
    /// `&&`
    And,
    /// `||`
    Or,
    /// A trailing or infix `&`.
    Background,
    /// An unescaped newline.
    Newline,
    /// `|`
    Pipe,
}

impl Operator {
    /// Returns `true` for operators that start an independent command.
    pub fn chains(self) -> bool {
        !matches!(self, Operator::Pipe)
    }
}

/// Command lines that are known to be harmless on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeForm {
    /// `echo` with plain words and no shell metacharacters.
    SimpleEcho,
}

impl SafeForm {
    pub fn detect(command: &str) -> Option<SafeForm> {
        SIMPLE_ECHO.is_match(command).then_some(SafeForm::SimpleEcho)
    }
}

/// The result of analyzing one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAnalysis {
    /// The command after stripping the injected working-directory prefix.
    pub command: String,
    /// The rule-matching key: the first word, or first two for multi-word tools.
    pub normalized_prefix: Option<String>,
    /// Set when the line chains or substitutes commands outside quotes.
    pub command_injection_detected: bool,
    /// No operators, substitutions or file redirections.
    pub is_simple: bool,
    /// The line is non-empty and its quoting is balanced.
    pub well_formed: bool,
    pub safe_form: Option<SafeForm>,
    /// The operator-separated pieces of the line, trimmed.
    pub segments: Vec<String>,
    /// The operators between segments, in order.
    pub operators: Vec<Operator>,
}

impl CommandAnalysis {
    fn empty(command: String) -> Self {
        Self {
            command,
            normalized_prefix: None,
            command_injection_detected: false,
            is_simple: false,
            well_formed: false,
            safe_form: None,
            segments: Vec::new(),
            operators: Vec::new(),
        }
    }

    /// Returns `true` if the line is a pipeline of otherwise plain commands.
    pub fn is_pipeline(&self) -> bool {
        !self.operators.is_empty() && self.operators.iter().all(|op| *op == Operator::Pipe)
    }

    /// The command with quoting removed, when it is a simple command.
    ///
    /// Prefix rules are matched against this form so that `"git" status`
    /// and `git status` are treated alike.
    pub fn unquoted_command(&self) -> Option<String> {
        if !self.is_simple {
            return None;
        }
        unquote(&self.command)
    }

    /// Every string a deny rule is checked against: the whole line and each
    /// segment, both as written and with quoting removed.
    pub fn deny_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.command.clone()];
        for segment in &self.segments {
            candidates.push(segment.clone());
        }
        if self.command_injection_detected {
            let ungrouped: Vec<String> = candidates.iter().filter_map(|c| ungroup(c)).collect();
            for candidate in ungrouped {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        let unquoted: Vec<String> = candidates.iter().filter_map(|c| unquote(c)).collect();
        for candidate in unquoted {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// Analyzes command lines for a given working directory.
#[derive(Debug, Clone, Default)]
pub struct CommandAnalyzer {
    working_directory: Option<PathBuf>,
}

impl CommandAnalyzer {
    pub fn new(working_directory: Option<&Path>) -> Self {
        Self {
            working_directory: working_directory.map(Path::to_path_buf),
        }
    }

    /// Analyzes a raw command line.
    ///
    /// # Example
    ///
    /// ```
    /// use toolguard::CommandAnalyzer;
    ///
    /// let analyzer = CommandAnalyzer::default();
    ///
    /// let analysis = analyzer.analyze("git commit -m 'fix; tests'");
    /// assert_eq!(analysis.normalized_prefix.as_deref(), Some("git commit"));
    /// assert!(!analysis.command_injection_detected);
    ///
    /// let analysis = analyzer.analyze("ls; rm -rf /");
    /// assert!(analysis.command_injection_detected);
    /// ```
    pub fn analyze(&self, raw: &str) -> CommandAnalysis {
        let command = self.strip_cd_prefix(raw.trim()).trim().to_string();
        if command.is_empty() {
            return CommandAnalysis::empty(command);
        }

        let Ok(scan) = scan(&command) else {
            // Unbalanced quotes or a dangling escape: nothing can be trusted.
            let mut analysis = CommandAnalysis::empty(command.clone());
            analysis.segments = vec![command];
            return analysis;
        };

        let plain = scan.operators.is_empty() && !scan.substitution && !scan.grouping;
        let safe_form = if plain { SafeForm::detect(&command) } else { None };
        let chained = scan.substitution || scan.grouping || scan.operators.iter().any(|op| op.chains());
        let is_simple = plain && !scan.redirection;
        let normalized_prefix = scan
            .segments
            .first()
            .and_then(|first| prefix_of(ungroup(first).as_deref().unwrap_or(first)));

        CommandAnalysis {
            command,
            normalized_prefix,
            command_injection_detected: chained && safe_form.is_none(),
            is_simple,
            well_formed: true,
            safe_form,
            segments: scan.segments,
            operators: scan.operators,
        }
    }

    /// Removes a leading `cd <working directory> && ` added by the caller.
    fn strip_cd_prefix<'c>(&self, command: &'c str) -> &'c str {
        let Some(dir) = &self.working_directory else {
            return command;
        };
        let dir = dir.to_string_lossy();
        let Some(rest) = command.strip_prefix("cd ") else {
            return command;
        };
        let rest = rest.trim_start();
        for quoted in [dir.to_string(), format!("\"{dir}\""), format!("'{dir}'")] {
            if let Some(tail) = rest.strip_prefix(quoted.as_str()) {
                if let Some(tail) = tail.trim_start().strip_prefix("&&") {
                    return tail;
                }
            }
        }
        command
    }
}

/// Computes the rule-matching prefix of a single command.
fn prefix_of(segment: &str) -> Option<String> {
    let words = shlex::split(segment)?;
    let first = words.first()?;
    if first.is_empty() || is_env_assignment(first) {
        return None;
    }

    if MULTI_WORD_TOOLS.contains(&first.as_str()) {
        if let Some(second) = words.get(1) {
            if is_subcommand(second) {
                return Some(format!("{first} {second}"));
            }
        }
    }
    Some(first.clone())
}

fn is_subcommand(word: &str) -> bool {
    !word.is_empty()
        && !word.starts_with('-')
        && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Strips subshell and brace-group delimiters from the ends of a segment.
///
/// Returns `None` when there is nothing to strip.
fn ungroup(segment: &str) -> Option<String> {
    let stripped = segment
        .trim_start_matches(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .trim_end_matches(|c: char| c == ')' || c == '}' || c == ';' || c.is_whitespace());
    (stripped.len() != segment.len() && !stripped.is_empty()).then(|| stripped.to_string())
}

fn unquote(command: &str) -> Option<String> {
    shlex::split(command).map(|words| words.join(" "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanError {
    UnterminatedQuote,
    DanglingEscape,
}

#[derive(Debug, Default)]
struct Scan {
    segments: Vec<String>,
    operators: Vec<Operator>,
    substitution: bool,
    grouping: bool,
    redirection: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Splits a command line on unquoted operators.
///
/// Single quotes make everything literal. Inside double quotes only
/// backticks and `$(` stay active. A backslash outside single quotes makes
/// the next character literal, so `\;` is data. Unquoted parentheses, and
/// braces at the start of a word, open or close a subshell or brace group.
fn scan(command: &str) -> Result<Scan, ScanError> {
    let chars: Vec<char> = command.chars().collect();
    let mut scan = Scan::default();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut i = 0;

    let finish = |scan: &mut Scan, current: &mut String, op: Operator| {
        scan.segments.push(current.trim().to_string());
        scan.operators.push(op);
        current.clear();
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match quote {
            Quote::Single => {
                current.push(c);
                if c == '\'' {
                    quote = Quote::None;
                }
            }
            Quote::Double => match c {
                '\\' => {
                    let escaped = next.ok_or(ScanError::DanglingEscape)?;
                    current.push(c);
                    current.push(escaped);
                    i += 1;
                }
                '"' => {
                    current.push(c);
                    quote = Quote::None;
                }
                '`' => {
                    scan.substitution = true;
                    current.push(c);
                }
                '$' if next == Some('(') => {
                    scan.substitution = true;
                    current.push(c);
                }
                _ => current.push(c),
            },
            Quote::None => match c {
                '\\' => {
                    let escaped = next.ok_or(ScanError::DanglingEscape)?;
                    current.push(c);
                    current.push(escaped);
                    i += 1;
                }
                '\'' => {
                    current.push(c);
                    quote = Quote::Single;
                }
                '"' => {
                    current.push(c);
                    quote = Quote::Double;
                }
                '`' => {
                    scan.substitution = true;
                    current.push(c);
                }
                '$' if next == Some('(') => {
                    scan.substitution = true;
                    current.push(c);
                }
                '(' | ')' => {
                    scan.grouping = true;
                    current.push(c);
                }
                '{' if at_word_start(&current) && next.is_none_or(char::is_whitespace) => {
                    scan.grouping = true;
                    current.push(c);
                }
                '}' if at_word_start(&current) => {
                    scan.grouping = true;
                    current.push(c);
                }
                ';' => finish(&mut scan, &mut current, Operator::Semicolon),
                '\n' => finish(&mut scan, &mut current, Operator::Newline),
                '&' if next == Some('&') => {
                    finish(&mut scan, &mut current, Operator::And);
                    i += 1;
                }
                '&' if current.ends_with(['>', '<']) => {
                    // `2>&1` and `<&3` duplicate descriptors.
                    current.push(c);
                }
                '&' if next == Some('>') => {
                    scan.redirection = true;
                    current.push(c);
                }
                '&' => finish(&mut scan, &mut current, Operator::Background),
                '|' if next == Some('|') => {
                    finish(&mut scan, &mut current, Operator::Or);
                    i += 1;
                }
                '|' if current.ends_with('>') => current.push(c),
                '|' => finish(&mut scan, &mut current, Operator::Pipe),
                '<' | '>' if next == Some('(') => {
                    scan.substitution = true;
                    current.push(c);
                }
                '>' | '<' => {
                    let dup = next == Some('&')
                        && chars
                            .get(i + 2)
                            .is_some_and(|d| d.is_ascii_digit() || *d == '-');
                    if !dup {
                        scan.redirection = true;
                    }
                    current.push(c);
                }
                _ => current.push(c),
            },
        }
        i += 1;
    }

    if quote != Quote::None {
        return Err(ScanError::UnterminatedQuote);
    }
    scan.segments.push(current.trim().to_string());
    Ok(scan)
}

fn at_word_start(current: &str) -> bool {
    current.is_empty() || current.ends_with(char::is_whitespace)
}
