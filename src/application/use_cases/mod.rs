pub mod filter_workspaces;
pub mod run_command;

pub use filter_workspaces::{filter, FilterWorkspacesConfig, FilterWorkspacesUseCase};
pub use run_command::{
    run_command_on, CommandStatus, PackageOutcome, RunCommandConfig, RunCommandUseCase, RunReport,
};
