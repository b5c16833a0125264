//! Toolguard CLI
//!
//! Evaluates a single agent action against the permission rules in the
//! user's and project's settings files and prints the decision as JSON.
//!
//! # Usage
//!
//! ```bash
//! toolguard check command "git status"
//! toolguard --mode acceptEdits check edit src/main.rs
//! toolguard tool Bash '{"command": "npm test"}'
//! ```
//!
//! The exit status is 0 for allow, 1 for deny and 2 for ask. `RUST_LOG`
//! overrides the log filter chosen by `--verbose`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use toolguard::{
    Action, PermissionBehavior, PermissionContext, PermissionEvaluator, PermissionMode, SettingsFiles,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "toolguard")]
#[command(about = "Decide whether an agent action is allowed, denied, or needs confirmation")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Permission mode; overrides the settings files
    #[arg(long)]
    mode: Option<PermissionMode>,

    /// Working directory the action runs in (defaults to the current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Global settings file (defaults to ~/.claude/settings.json)
    #[arg(long)]
    global_settings: Option<PathBuf>,

    /// Project settings file; may be repeated (defaults to .claude/settings.json
    /// and .claude/settings.local.json in the working directory)
    #[arg(long)]
    project_settings: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a read, an edit or a shell command
    Check {
        kind: KindArg,
        /// The path or command line
        target: String,
    },
    /// Check a raw tool call, e.g. `Write '{"file_path": "a.txt"}'`
    Tool {
        name: String,
        /// The tool input as JSON
        input: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Read,
    Edit,
    Command,
}

fn settings_files(args: &Args, cwd: &Path) -> SettingsFiles {
    let discovered = SettingsFiles::discover(cwd);
    if args.global_settings.is_none() && args.project_settings.is_empty() {
        return discovered;
    }

    let mut files = SettingsFiles::new();
    if let Some(global) = &args.global_settings {
        files = files.with_global(global);
    }
    for project in &args.project_settings {
        files = files.with_project(project);
    }
    files
}

fn load_context(args: &Args) -> Result<PermissionContext> {
    let cwd = match &args.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir().context("failed to determine the current directory")?,
    };
    let cwd = std::path::absolute(&cwd)
        .with_context(|| format!("invalid working directory {}", cwd.display()))?;

    let store = settings_files(args, &cwd);
    debug!(?store, "loading settings");
    let context = PermissionContext::load(&store, cwd.clone())
        .context("failed to load permission settings")?;

    Ok(match args.mode {
        Some(mode) => context.with_mode(mode),
        None => context,
    })
}

fn action(command: &Command) -> Result<Action> {
    Ok(match command {
        Command::Check { kind, target } => match kind {
            KindArg::Read => Action::read(target.as_str()),
            KindArg::Edit => Action::edit(target.as_str()),
            KindArg::Command => Action::command(target.as_str()),
        },
        Command::Tool { name, input } => {
            let input = serde_json::from_str(input).context("tool input is not valid JSON")?;
            Action::from_tool_input(name, input)
        }
    })
}

/// `RUST_LOG` wins when it parses; otherwise `--verbose` picks the level.
fn log_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let default = if verbose {
        "toolguard=trace,toolguard_cli=trace"
    } else {
        "toolguard=warn,toolguard_cli=info"
    };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), args.verbose))
        .with_writer(std::io::stderr)
        .init();

    let context = load_context(&args)?;
    let action = action(&args.command)?;
    info!(mode = %context.mode(), cwd = %context.working_directory().display(), "evaluating");

    let decision = PermissionEvaluator::new().evaluate(&action, &context);
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(match decision.behavior() {
        PermissionBehavior::Allow => ExitCode::SUCCESS,
        PermissionBehavior::Deny => ExitCode::from(1),
        PermissionBehavior::Ask => ExitCode::from(2),
    })
}
