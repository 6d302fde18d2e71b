use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

use crate::common::error::WsFilterError;
use crate::domain::entities::package::PackageMetadata;
use crate::domain::entities::workspace_graph::WorkspaceGraph;
use crate::infrastructure::filesystem::root_manifest::DEFAULT_PACKAGE_MANAGER;
use crate::infrastructure::process::command_executor::{
    CommandExecutor, CommandExecutorError, CommandLine, ExecutionConfig, ProcessRunner,
};

/// Environment variable holding the package name inside each command
pub const PACKAGE_NAME_ENV: &str = "WORKSPACES_FILTER_PACKAGE";

/// Environment variable holding the package directory inside each command
pub const PACKAGE_DIR_ENV: &str = "WORKSPACES_FILTER_PACKAGE_DIR";

/// Settings for running a command across packages
#[derive(Debug, Clone)]
pub struct RunCommandConfig {
    /// Directory package directories are relative to
    pub base_dir: PathBuf,

    /// Run the arguments as one shell command line instead of a package script
    pub is_shell: bool,

    /// Package manager binary used in script mode
    pub package_manager: String,

    /// Maximum number of packages running at once (`None` runs all together)
    pub max_parallel: Option<usize>,

    /// Extra environment variables for every command
    pub environment_variables: HashMap<String, String>,

    /// Receives each outcome as soon as its package finishes
    pub outcome_sender: Option<mpsc::UnboundedSender<PackageOutcome>>,
}

impl RunCommandConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            is_shell: false,
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            max_parallel: None,
            environment_variables: HashMap::new(),
            outcome_sender: None,
        }
    }

    pub fn with_shell(mut self, is_shell: bool) -> Self {
        self.is_shell = is_shell;
        self
    }

    pub fn with_package_manager(mut self, package_manager: impl Into<String>) -> Self {
        self.package_manager = package_manager.into();
        self
    }

    /// Limit concurrency; `0` is treated as `1`
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel.max(1));
        self
    }

    pub fn with_environment_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_outcome_sender(mut self, sender: mpsc::UnboundedSender<PackageOutcome>) -> Self {
        self.outcome_sender = Some(sender);
        self
    }
}

/// Final state of a package command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandStatus {
    Success,
    Failed,
}

/// Outcome of the command in one package
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    /// Package name
    pub name: String,

    /// Package directory relative to the base directory
    pub directory: String,

    /// Command line as displayed to the user
    pub command: String,

    pub status: CommandStatus,

    /// Exit code when the process ran to completion
    pub exit_code: Option<i32>,

    pub execution_time_ms: u64,

    /// Set when the command failed to spawn or exited non-zero
    pub error: Option<Arc<WsFilterError>>,
}

impl PackageOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == CommandStatus::Failed
    }
}

/// Result of a fan-out: the untouched input graph plus one outcome per package
#[derive(Debug)]
pub struct RunReport {
    pub graph: WorkspaceGraph,

    /// Outcomes in completion order
    pub outcomes: Vec<PackageOutcome>,

    /// Wall-clock time of the whole fan-out in milliseconds
    pub total_execution_time_ms: u64,
}

impl RunReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// True when no package failed
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn failed_outcomes(&self) -> Vec<&PackageOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure()).collect()
    }

    pub fn outcome(&self, name: &str) -> Option<&PackageOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// Runs one command in every package of a graph, concurrently, with
/// failures isolated per package
pub struct RunCommandUseCase<R = CommandExecutor> {
    config: RunCommandConfig,
    runner: R,
}

impl RunCommandUseCase<CommandExecutor> {
    pub fn new(config: RunCommandConfig) -> Self {
        Self::with_runner(config, CommandExecutor::new())
    }
}

impl<R: ProcessRunner> RunCommandUseCase<R> {
    pub fn with_runner(config: RunCommandConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Run `args` in every package of `graph`.
    ///
    /// Never fails as a whole: package failures, including an empty command,
    /// are logged and recorded in the report. Every package is attempted and
    /// the report carries `graph` back unchanged once all of them finished.
    pub async fn execute(&self, args: &[String], graph: WorkspaceGraph) -> RunReport {
        let start_time = Instant::now();
        let semaphore = self.config.max_parallel.map(Semaphore::new);

        let outcomes = join_all(
            graph
                .packages()
                .map(|package| self.run_in_package(args, package, semaphore.as_ref())),
        )
        .await;

        RunReport {
            graph,
            outcomes,
            total_execution_time_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    /// Command line to run in `package`.
    ///
    /// In script mode a name declared in `scripts` runs as
    /// `<pm> run <script> <args>`; anything else is passed straight to the
    /// package manager as `<pm> <script> <args>` so subcommands like `add`
    /// work too.
    pub fn build_command_line(&self, args: &[String], package: &PackageMetadata) -> CommandLine {
        if self.config.is_shell {
            return CommandLine::shell(args.join(" "));
        }

        let (script, rest) = match args.split_first() {
            Some((script, rest)) => (script.as_str(), rest),
            None => ("", args),
        };

        let mut pm_args = Vec::with_capacity(args.len() + 1);
        if package.has_script(script) {
            pm_args.push("run".to_string());
        }
        pm_args.push(script.to_string());
        pm_args.extend(rest.iter().cloned());

        CommandLine::new(self.config.package_manager.clone(), pm_args)
    }

    async fn run_in_package(
        &self,
        args: &[String],
        package: &PackageMetadata,
        semaphore: Option<&Semaphore>,
    ) -> PackageOutcome {
        let _permit = match semaphore {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        };

        let command = self.build_command_line(args, package);
        let working_dir = self.config.base_dir.join(&package.directory);
        let exec_config = ExecutionConfig::new(&working_dir)
            .with_environment_variables(self.config.environment_variables.clone())
            .with_environment_variable(PACKAGE_NAME_ENV, package.name.clone())
            .with_environment_variable(PACKAGE_DIR_ENV, working_dir.display().to_string());

        if !self.config.is_shell {
            info!("Running in \"{}\" ({})", package.directory, package.name);
        }

        let start_time = Instant::now();
        let shown = command.to_string();
        let result = if args.iter().all(|a| a.trim().is_empty()) {
            Err(CommandExecutorError::InvalidCommand(
                "No command provided.".to_string(),
            ))
        } else {
            self.runner.run(&command, &exec_config).await
        };
        let elapsed = start_time.elapsed().as_millis() as u64;

        let (exit_code, failure) = match result {
            Ok(result) if result.success => (result.exit_code, None),
            Ok(result) => (
                result.exit_code,
                Some(WsFilterError::command_error(
                    &package.name,
                    &shown,
                    result.exit_code,
                )),
            ),
            Err(CommandExecutorError::InvalidCommand(message)) => (
                None,
                Some(WsFilterError::invalid_argument("command", message)),
            ),
            Err(e) => {
                let failure = match e.into_io_error() {
                    Some(io_error) => {
                        WsFilterError::command_error_with_source(&package.name, &shown, io_error)
                    }
                    None => WsFilterError::command_error(&package.name, &shown, None),
                };
                (None, Some(failure))
            }
        };

        if let Some(failure) = &failure {
            error!(
                package = %package.name,
                directory = %package.directory,
                "{}",
                error_chain(failure)
            );
        }

        let outcome = PackageOutcome {
            name: package.name.clone(),
            directory: package.directory.clone(),
            command: shown,
            status: if failure.is_none() {
                CommandStatus::Success
            } else {
                CommandStatus::Failed
            },
            exit_code,
            execution_time_ms: elapsed,
            error: failure.map(Arc::new),
        };

        if let Some(sender) = &self.config.outcome_sender {
            // A dropped receiver only means nobody is listening anymore.
            let _ = sender.send(outcome.clone());
        }

        outcome
    }
}

/// Run `args` in every package of `graph` with the default process runner
pub async fn run_command_on(
    args: &[String],
    graph: WorkspaceGraph,
    config: RunCommandConfig,
) -> RunReport {
    RunCommandUseCase::new(config).execute(args, graph).await
}

/// `error: cause: cause` rendering of an error and its sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
