use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Command executor errors
#[derive(Debug, Error)]
pub enum CommandExecutorError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for '{command}': {source}")]
    WaitFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandExecutorError {
    /// Underlying I/O error, if any
    pub fn into_io_error(self) -> Option<std::io::Error> {
        match self {
            Self::SpawnFailed { source, .. } | Self::WaitFailed { source, .. } => Some(source),
            Self::InvalidCommand(_) => None,
        }
    }
}

/// Program plus arguments, spawned without an intermediate shell unless
/// built with [`CommandLine::shell`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run `command_line` through the platform shell
    pub fn shell(command_line: impl Into<String>) -> Self {
        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self::new(shell, vec![flag.to_string(), command_line.into()])
    }

    fn shell_script(&self) -> Option<&str> {
        let is_shell = matches!(
            (self.program.as_str(), self.args.first().map(String::as_str)),
            ("sh", Some("-c")) | ("cmd", Some("/C"))
        );
        if is_shell && self.args.len() == 2 {
            Some(self.args[1].as_str())
        } else {
            None
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(script) = self.shell_script() {
            return f.write_str(script);
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Configuration for command execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Working directory for command execution
    pub working_directory: PathBuf,

    /// Environment variables added to the inherited environment
    pub environment_variables: HashMap<String, String>,
}

impl ExecutionConfig {
    pub fn new(working_directory: impl AsRef<Path>) -> Self {
        Self {
            working_directory: working_directory.as_ref().to_path_buf(),
            environment_variables: HashMap::new(),
        }
    }

    pub fn with_environment_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_environment_variables(mut self, vars: HashMap<String, String>) -> Self {
        self.environment_variables.extend(vars);
        self
    }
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,

    /// Whether the command exited with status 0
    pub success: bool,
}

impl ExecutionResult {
    pub fn new(exit_code: Option<i32>, execution_time_ms: u64) -> Self {
        Self {
            exit_code,
            execution_time_ms,
            success: exit_code == Some(0),
        }
    }
}

/// Spawns processes. Implemented by [`CommandExecutor`]; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion. A non-zero exit is reported through
    /// [`ExecutionResult::success`], not as an error.
    async fn run(
        &self,
        command: &CommandLine,
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, CommandExecutorError>;
}

/// Runs commands with stdout and stderr attached to the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for CommandExecutor {
    async fn run(
        &self,
        command: &CommandLine,
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, CommandExecutorError> {
        if command.program.trim().is_empty() {
            return Err(CommandExecutorError::InvalidCommand(
                "Command is empty".to_string(),
            ));
        }

        let start_time = Instant::now();
        let shown = command.to_string();

        let mut cmd = TokioCommand::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&config.working_directory)
            .envs(&config.environment_variables)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!(command = %shown, cwd = %config.working_directory.display(), "spawning");

        let mut child = cmd.spawn().map_err(|source| CommandExecutorError::SpawnFailed {
            command: shown.clone(),
            source,
        })?;

        let status = child
            .wait()
            .await
            .map_err(|source| CommandExecutorError::WaitFailed {
                command: shown,
                source,
            })?;

        Ok(ExecutionResult::new(
            status.code(),
            start_time.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_command_line() {
        let command = CommandLine::shell("echo 'Hello World'");
        if cfg!(target_os = "windows") {
            assert_eq!(command.program, "cmd");
            assert_eq!(command.args, vec!["/C", "echo 'Hello World'"]);
        } else {
            assert_eq!(command.program, "sh");
            assert_eq!(command.args, vec!["-c", "echo 'Hello World'"]);
        }
        assert_eq!(command.to_string(), "echo 'Hello World'");
    }

    #[test]
    fn test_display_joins_arguments() {
        let command = CommandLine::new("bun", vec!["run".into(), "build".into(), "--watch".into()]);
        assert_eq!(command.to_string(), "bun run build --watch");
    }

    #[test]
    fn test_execution_result_creation() {
        assert!(ExecutionResult::new(Some(0), 10).success);
        assert!(!ExecutionResult::new(Some(1), 10).success);
        assert!(!ExecutionResult::new(None, 10).success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExecutionConfig::new(temp_dir.path());

        let ok = CommandExecutor::new()
            .run(&CommandLine::shell("true"), &config)
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.exit_code, Some(0));

        let failed = CommandExecutor::new()
            .run(&CommandLine::shell("exit 3"), &config)
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_directory_and_environment() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExecutionConfig::new(temp_dir.path()).with_environment_variable("WSF_TEST", "ok");

        let result = CommandExecutor::new()
            .run(
                &CommandLine::shell("test \"$WSF_TEST\" = ok && pwd > cwd.txt"),
                &config,
            )
            .await
            .unwrap();
        assert!(result.success);

        let written = std::fs::read_to_string(temp_dir.path().join("cwd.txt")).unwrap();
        let expected = temp_dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(written.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let temp_dir = TempDir::new().unwrap();
        let config = ExecutionConfig::new(temp_dir.path());

        let result = CommandExecutor::new()
            .run(
                &CommandLine::new("wsf-definitely-not-a-program", vec![]),
                &config,
            )
            .await;
        assert!(matches!(result, Err(CommandExecutorError::SpawnFailed { .. })));
    }
}
