//! Shell command parsing for decomposing pipelines into sub-commands.
//!
//! The [`CommandAnalyzer`](crate::CommandAnalyzer) decides whether a command line is
//! safe to look at more closely. This module does the closer look: it parses
//! the line with `conch-parser` so each stage of a pipeline can be evaluated
//! on its own.
//!
//! [`parse`] models `&&` and `||` lists as well as pipelines, so a caller can
//! see every command a line runs. The evaluator only decomposes pure
//! pipelines; lists reach it already flagged as possible injection.
//!
//! # Supported Features
//!
//! - **Simple commands**: `git status`, `cargo build --release`
//! - **Pipelines**: `find . | grep foo | head -10`
//! - **Logical AND / OR**: `make && make test`, `test -f foo || touch foo`
//! - **Quoted strings**: `git commit -m "hello world"`, `find . -name '*.rs'`
//! - **Escaped characters**: `echo hello\ world`
//! - **Glob patterns**: `ls *.rs` (preserved as literal strings)
//! - **Descriptor duplication**: `make 2>&1 | tee log.txt`
//!
//! # Unsupported Features
//!
//! These return [`ParseError::Unsupported`], since what they run depends on
//! runtime state:
//!
//! - **Command substitution**: `$(cmd)` or `` `cmd` ``
//! - **Parameter expansion**: `$VAR`, `${VAR}`
//! - **Compound commands**: `if`, `for`, `while`, `case`, subshells, brace groups
//! - **Function definitions**: `foo() { ... }`
//! - **Environment assignments**: `FOO=1 cmd`
//! - **File redirections**: `cmd > out.txt`, `cmd < in.txt`
//!
//! # Example
//!
//! ```
//! use toolguard::shell::{parse, ShellAst};
//!
//! let ast = parse("find . | grep foo").unwrap();
//! if let ShellAst::Pipeline(cmds) = ast {
//!     assert_eq!(cmds.len(), 2);
//! }
//!
//! assert!(parse("echo $HOME").is_err());
//! ```

use conch_parser::ast;
use conch_parser::lexer::Lexer;
use conch_parser::parse::DefaultParser;
use thiserror::Error;

/// A parsed simple command (executable with arguments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The command name (e.g., "git", "cargo").
    pub name: String,
    /// The arguments following the command name, unquoted.
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Returns the subcommand (first argument), if present.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Renders the command back to a single line, quoting words as needed.
    ///
    /// Returns `None` if a word cannot be quoted safely (e.g. it contains a
    /// NUL byte).
    pub fn to_command_line(&self) -> Option<String> {
        let words = std::iter::once(self.name.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).ok()
    }
}

/// Abstract syntax tree for shell commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellAst {
    /// A simple command (executable with arguments).
    Simple(ParsedCommand),

    /// A pipeline of commands (cmd1 | cmd2 | ...).
    Pipeline(Vec<ShellAst>),

    /// Logical AND (cmd1 && cmd2).
    And(Vec<ShellAst>),

    /// Logical OR (cmd1 || cmd2).
    Or(Vec<ShellAst>),
}

/// Error type for shell parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Parses a shell command string into a `ShellAst`.
///
/// # Example
///
/// ```
/// use toolguard::shell::{parse, ShellAst};
///
/// let ast = parse("git status").unwrap();
/// assert!(matches!(ast, ShellAst::Simple(_)));
///
/// let ast = parse("make && make test").unwrap();
/// assert!(matches!(ast, ShellAst::And(_)));
/// ```
pub fn parse(input: &str) -> Result<ShellAst, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let lexer = Lexer::new(trimmed.chars());
    let mut parser = DefaultParser::new(lexer);

    let ast = match parser.complete_command() {
        Ok(Some(cmd)) => convert_top_level_command(&cmd)?,
        Ok(None) => return Err(ParseError::Empty),
        Err(e) => return Err(ParseError::Syntax(format!("{:?}", e))),
    };

    // `complete_command` stops at the first separator; anything left over is
    // a second command this AST does not describe.
    match parser.complete_command() {
        Ok(None) => Ok(ast),
        Ok(Some(_)) => Err(ParseError::Unsupported("multiple commands".into())),
        Err(e) => Err(ParseError::Syntax(format!("{:?}", e))),
    }
}

/// Splits a command line into the command lines of its simple commands.
///
/// Returns `None` when the line cannot be parsed or uses a construct whose
/// effect cannot be attributed to a single sub-command.
///
/// ```
/// use toolguard::shell::decompose;
///
/// let parts = decompose("cat 'my file' | grep foo").unwrap();
/// assert_eq!(parts, vec!["cat 'my file'", "grep foo"]);
/// ```
pub fn decompose(command: &str) -> Option<Vec<String>> {
    let ast = parse(command).ok()?;
    ast.commands().map(ParsedCommand::to_command_line).collect()
}

type DefaultTopLevelCommand = ast::TopLevelCommand<String>;
type DefaultCommand = ast::DefaultCommand;
type DefaultListableCommand = ast::DefaultListableCommand;
type DefaultPipeableCommand = ast::DefaultPipeableCommand;
type DefaultSimpleCommand = ast::DefaultSimpleCommand;
type DefaultRedirect = ast::Redirect<ast::TopLevelWord<String>>;
type DefaultTopLevelWord = ast::TopLevelWord<String>;
type DefaultWord = ast::DefaultWord;
type DefaultComplexWord = ast::DefaultComplexWord;
type DefaultSimpleWord = ast::DefaultSimpleWord;

fn convert_top_level_command(cmd: &DefaultTopLevelCommand) -> Result<ShellAst, ParseError> {
    let ast::TopLevelCommand(cmd) = cmd;
    convert_command(cmd)
}

fn convert_command(cmd: &DefaultCommand) -> Result<ShellAst, ParseError> {
    match cmd {
        ast::Command::Job(_) => Err(ParseError::Unsupported("background jobs".into())),
        ast::Command::List(list) => convert_and_or_list(list),
    }
}

fn convert_and_or_list(list: &ast::DefaultAndOrList) -> Result<ShellAst, ParseError> {
    let mut result = convert_listable_command(&list.first)?;

    for and_or in &list.rest {
        result = match and_or {
            ast::AndOr::And(cmd) => {
                let right = convert_listable_command(cmd)?;
                match result {
                    ShellAst::And(mut items) => {
                        items.push(right);
                        ShellAst::And(items)
                    }
                    other => ShellAst::And(vec![other, right]),
                }
            }
            ast::AndOr::Or(cmd) => {
                let right = convert_listable_command(cmd)?;
                match result {
                    ShellAst::Or(mut items) => {
                        items.push(right);
                        ShellAst::Or(items)
                    }
                    other => ShellAst::Or(vec![other, right]),
                }
            }
        };
    }

    Ok(result)
}

fn convert_listable_command(cmd: &DefaultListableCommand) -> Result<ShellAst, ParseError> {
    match cmd {
        ast::ListableCommand::Single(pipeable) => convert_pipeable_command(pipeable),
        ast::ListableCommand::Pipe(negated, cmds) => {
            if *negated {
                return Err(ParseError::Unsupported("negated pipelines".into()));
            }
            let converted: Result<Vec<_>, _> = cmds.iter().map(convert_pipeable_command).collect();
            Ok(ShellAst::Pipeline(converted?))
        }
    }
}

fn convert_pipeable_command(cmd: &DefaultPipeableCommand) -> Result<ShellAst, ParseError> {
    match cmd {
        ast::PipeableCommand::Simple(simple) => convert_simple_command(simple),
        ast::PipeableCommand::Compound(_) => Err(ParseError::Unsupported(
            "compound commands (if/for/while/case/subshells/brace groups)".into(),
        )),
        ast::PipeableCommand::FunctionDef(_, _) => {
            Err(ParseError::Unsupported("function definitions".into()))
        }
    }
}

fn convert_simple_command(cmd: &DefaultSimpleCommand) -> Result<ShellAst, ParseError> {
    for item in &cmd.redirects_or_env_vars {
        match item {
            ast::RedirectOrEnvVar::Redirect(redirect) => check_redirect(redirect)?,
            ast::RedirectOrEnvVar::EnvVar(..) => {
                return Err(ParseError::Unsupported("environment assignments".into()));
            }
        }
    }

    let mut words = Vec::new();
    for item in &cmd.redirects_or_cmd_words {
        match item {
            ast::RedirectOrCmdWord::CmdWord(word) => words.push(convert_top_level_word(word)?),
            ast::RedirectOrCmdWord::Redirect(redirect) => check_redirect(redirect)?,
        }
    }

    if words.is_empty() {
        return Err(ParseError::Unsupported("commands without a name".into()));
    }

    let name = words.remove(0);
    Ok(ShellAst::Simple(ParsedCommand::new(name, words)))
}

/// Descriptor duplication is harmless; anything touching a file is not.
fn check_redirect(redirect: &DefaultRedirect) -> Result<(), ParseError> {
    match redirect {
        ast::Redirect::DupRead(..) | ast::Redirect::DupWrite(..) => Ok(()),
        _ => Err(ParseError::Unsupported("file redirections".into())),
    }
}

fn convert_top_level_word(word: &DefaultTopLevelWord) -> Result<String, ParseError> {
    let ast::TopLevelWord(complex) = word;
    convert_complex_word(complex)
}

fn convert_complex_word(word: &DefaultComplexWord) -> Result<String, ParseError> {
    match word {
        ast::ComplexWord::Single(w) => convert_word(w),
        ast::ComplexWord::Concat(words) => {
            let parts: Result<Vec<_>, _> = words.iter().map(convert_word).collect();
            Ok(parts?.join(""))
        }
    }
}

fn convert_word(word: &DefaultWord) -> Result<String, ParseError> {
    match word {
        ast::Word::Simple(simple) => convert_simple_word(simple),
        ast::Word::DoubleQuoted(words) => {
            let parts: Result<Vec<_>, _> = words.iter().map(convert_simple_word).collect();
            Ok(parts?.join(""))
        }
        ast::Word::SingleQuoted(s) => Ok(s.clone()),
    }
}

fn convert_simple_word(word: &DefaultSimpleWord) -> Result<String, ParseError> {
    match word {
        ast::SimpleWord::Literal(s) => Ok(s.clone()),
        ast::SimpleWord::Escaped(s) => Ok(s.clone()),
        ast::SimpleWord::Colon => Ok(":".into()),
        ast::SimpleWord::Tilde => Ok("~".into()),
        ast::SimpleWord::SquareOpen => Ok("[".into()),
        ast::SimpleWord::SquareClose => Ok("]".into()),
        ast::SimpleWord::Question => Ok("?".into()),
        ast::SimpleWord::Star => Ok("*".into()),
        ast::SimpleWord::Subst(_) => Err(ParseError::Unsupported("command substitution".into())),
        ast::SimpleWord::Param(_) => Err(ParseError::Unsupported("parameter expansion".into())),
    }
}

impl ShellAst {
    /// Returns an iterator over all simple commands in this AST.
    pub fn commands(&self) -> impl Iterator<Item = &ParsedCommand> {
        let mut commands = Vec::new();
        self.collect_commands(&mut commands);
        commands.into_iter()
    }

    fn collect_commands<'a>(&'a self, out: &mut Vec<&'a ParsedCommand>) {
        match self {
            ShellAst::Simple(cmd) => out.push(cmd),
            ShellAst::Pipeline(cmds) | ShellAst::And(cmds) | ShellAst::Or(cmds) => {
                for cmd in cmds {
                    cmd.collect_commands(out);
                }
            }
        }
    }

    /// Returns the simple command if this is one, `None` otherwise.
    pub fn as_simple(&self) -> Option<&ParsedCommand> {
        match self {
            ShellAst::Simple(cmd) => Some(cmd),
            _ => None,
        }
    }
}
