use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsFilterError {
    #[error("Invalid argument: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Failed to read manifest {}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Manifest {} has no package name", path.display())]
    MissingPackageName { path: PathBuf },

    #[error("Workspace configuration error: {message}")]
    WorkspaceConfig {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Command `{command}` failed in package '{package}'{}", exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    CommandExecution {
        package: String,
        command: String,
        exit_code: Option<i32>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WsFilterError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn manifest_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ManifestRead {
            path: path.into(),
            source,
        }
    }

    pub fn manifest_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ManifestParse {
            path: path.into(),
            source,
        }
    }

    pub fn workspace_config_with_source(
        message: impl Into<String>,
        path: Option<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::WorkspaceConfig {
            message: message.into(),
            path,
            source: Some(Box::new(source)),
        }
    }

    pub fn command_error(
        package: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::CommandExecution {
            package: package.into(),
            command: command.into(),
            exit_code,
            source: None,
        }
    }

    pub fn command_error_with_source(
        package: impl Into<String>,
        command: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::CommandExecution {
            package: package.into(),
            command: command.into(),
            exit_code: None,
            source: Some(source),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error was raised before any work started
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}
