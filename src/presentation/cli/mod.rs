use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::env;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing_subscriber::EnvFilter;

use crate::application::use_cases::filter_workspaces::filter;
use crate::application::use_cases::run_command::{RunCommandConfig, RunCommandUseCase, RunReport};
use crate::domain::entities::workspace_graph::WorkspaceGraph;
use crate::infrastructure::filesystem::root_manifest::resolve_workspace;

/// Patterns that select every package. `_` exists because an unquoted `*`
/// is expanded by the shell.
const SELECT_ALL_ALIASES: [&str; 3] = [".", "_", "*"];

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("WSF_GIT_HASH"),
    " ",
    env!("WSF_BUILD_DATE"),
    ")\ntarget: ",
    env!("WSF_BUILD_TARGET"),
);

const EXAMPLES: &str = "\
Examples:
  workspaces-filter . build                  # run in all packages of all workspaces
  workspaces-filter _ build                  # because the \"*\" would not work if raw
  workspaces-filter '*' build                # should be quoted to avoid shell globbing

  workspaces-filter \"*preset*\" build
  workspaces-filter \"*preset*\" add foo-pkg barry-pkg
  workspaces-filter \"*preset*\" add --dev typescript

  workspaces-filter \"./packages/foo\" -- echo \"Hello, World!\"
  workspaces-filter \"./packages/*preset*\" -- pwd

  workspaces-filter \"*preset*\" --print names
  workspaces-filter \"*preset*\" --print json
  workspaces-filter \"*preset*\" --print dirs

Options must come before the command: everything after the script name,
including flags such as --print, is passed on to it.";

const NO_WORKSPACES_MESSAGE: &str = "No workspaces found! Make sure you have 'workspaces' field \
in your package.json or 'packages' field in your pnpm-workspace.yaml";

const NO_MATCH_MESSAGE: &str = "No packages matching the filter.";

/// What `--print` writes instead of running a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrintMode {
    /// Package names, one per line
    Names,
    /// JSON object of package name to metadata
    Json,
    /// Package directories, one per line
    Dirs,
}

/// workspaces-filter - run commands in selected monorepo packages
#[derive(Debug, Parser)]
#[command(name = "workspaces-filter")]
#[command(about = "Select by package name or workspace directory")]
#[command(version, long_version = LONG_VERSION)]
#[command(override_usage = "workspaces-filter [OPTIONS] <PATTERN> [COMMAND]...\n       \
workspaces-filter [OPTIONS] <PATTERN> -- <SHELL COMMAND>...")]
#[command(after_help = EXAMPLES)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Package name or directory glob; `.`, `_` or `*` selects every package
    pub pattern: String,

    /// Script to run, or package manager subcommand, with its arguments.
    /// Everything after it is forwarded, so options go before it
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Print the selected packages without running a command
    #[arg(long, value_enum)]
    pub print: Option<PrintMode>,

    /// Workspace root (defaults to the current directory)
    #[arg(long, env = "WORKSPACES_FILTER_CWD")]
    pub cwd: Option<PathBuf>,

    /// Package manager to use. Defaults to packageManager from the root
    /// package.json, or bun
    #[arg(long = "package-manager", visible_alias = "pm", env = "WORKSPACES_FILTER_PM")]
    pub package_manager: Option<String>,

    /// Maximum number of packages running at once (unlimited by default)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// CLI application runner
#[derive(Debug)]
pub struct CliApp {
    cli: Cli,
    shell_command: Vec<String>,
}

impl Default for CliApp {
    fn default() -> Self {
        Self::new()
    }
}

impl CliApp {
    pub fn new() -> Self {
        Self::from_args(env::args_os())
    }

    /// Parse `args` (including the program name). Everything after the
    /// first `--` is kept aside as a shell command line.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let (args, shell_command) = split_shell_command(args);
        Self {
            cli: Cli::parse_from(args),
            shell_command,
        }
    }

    pub async fn run(self) -> Result<()> {
        if self.cli.no_color {
            colored::control::set_override(false);
        }
        init_tracing(self.cli.verbose, !self.cli.no_color);

        match self.handle_command().await {
            Ok(true) => Ok(()),
            Ok(false) => exit(1),
            Err(e) => {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                exit(1);
            }
        }
    }

    /// Returns `false` when at least one package command failed
    async fn handle_command(&self) -> Result<bool> {
        if self.command_args().is_empty() && self.cli.print.is_none() {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            return Ok(true);
        }

        let base_dir = self.base_dir()?;
        let settings = resolve_workspace(&base_dir, self.cli.package_manager.as_deref())
            .await
            .with_context(|| format!("Failed to read workspace at {}", base_dir.display()))?;

        if settings.workspace_globs.is_empty() {
            println!("{NO_WORKSPACES_MESSAGE}");
            return Ok(true);
        }

        let pattern = if SELECT_ALL_ALIASES.contains(&self.cli.pattern.as_str()) {
            "*"
        } else {
            self.cli.pattern.as_str()
        };
        let selected = filter(&settings.workspace_globs, [pattern], &base_dir).await?;

        if let Some(mode) = self.cli.print {
            print_selection(&selected, mode)?;
            return Ok(true);
        }

        if selected.is_empty() {
            println!("{NO_MATCH_MESSAGE}");
            return Ok(true);
        }

        let mut config = RunCommandConfig::new(&base_dir)
            .with_shell(self.cli.command.is_empty())
            .with_package_manager(settings.package_manager);
        if let Some(jobs) = self.cli.jobs {
            config = config.with_max_parallel(jobs);
        }

        let report = RunCommandUseCase::new(config)
            .execute(&self.command_args(), selected)
            .await;
        self.print_report(&report);

        Ok(report.is_success())
    }

    /// The command tokens: the script and its arguments, followed by
    /// anything after `--`; in shell mode only the tokens after `--`
    fn command_args(&self) -> Vec<String> {
        self.cli
            .command
            .iter()
            .chain(&self.shell_command)
            .cloned()
            .collect()
    }

    fn base_dir(&self) -> Result<PathBuf> {
        let current = env::current_dir().context("Cannot determine current directory")?;
        Ok(match &self.cli.cwd {
            Some(dir) => absolutize(&current, dir),
            None => current,
        })
    }

    fn print_report(&self, report: &RunReport) {
        if self.cli.verbose {
            eprintln!(
                "{} Finished in {} packages ({} ms)",
                "✓".green().bold(),
                report.outcomes.len(),
                report.total_execution_time_ms
            );
            eprintln!("  Successful executions: {}", report.success_count());
            eprintln!("  Failed executions: {}", report.failure_count());
        }

        let failed = report.failed_outcomes();
        if failed.is_empty() {
            return;
        }

        eprintln!(
            "{} {} of {} packages failed:",
            "⚠".yellow().bold(),
            failed.len(),
            report.outcomes.len()
        );
        for outcome in failed {
            let message = outcome
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            eprintln!("  {}: {}", outcome.name.bold(), message.red());
        }
    }
}

fn init_tracing(verbose: bool, color: bool) {
    let default_level = if verbose {
        "workspaces_filter=debug"
    } else {
        "workspaces_filter=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed when running inside tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(color && std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_selection(graph: &WorkspaceGraph, mode: PrintMode) -> Result<()> {
    match mode {
        PrintMode::Json => println!("{}", serde_json::to_string(graph)?),
        PrintMode::Names => {
            for name in graph.names() {
                println!("{name}");
            }
        }
        PrintMode::Dirs => {
            for directory in graph.directories() {
                println!("{directory}");
            }
        }
    }
    Ok(())
}

fn split_shell_command<I, T>(args: I) -> (Vec<OsString>, Vec<String>)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let before: Vec<OsString> = args.by_ref().take_while(|arg| arg != "--").collect();
    let after = args.map(|arg| arg.to_string_lossy().into_owned()).collect();
    (before, after)
}

fn absolutize(current: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        current.join(dir)
    }
}
