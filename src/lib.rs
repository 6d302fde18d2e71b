//! # workspaces-filter - run commands in selected monorepo packages
//!
//! `workspaces-filter` finds the packages of a JavaScript/TypeScript monorepo,
//! selects some of them by name or directory, and runs a package script or a
//! shell command in each selected package at the same time.
//!
//! ## Features
//!
//! - **Workspace Discovery**: Package directories come from the `workspaces`
//!   globs of the root `package.json` (or `pnpm-workspace.yaml`)
//! - **Selection**: Exact names, substrings, or globs such as `*preset*`,
//!   `@scope/*` and `packages/{foo,bar}`
//! - **Concurrent Execution**: Every selected package runs at once; one
//!   failing package never stops the others
//!
//! ## Architecture
//!
//! The crate is organized using clean architecture principles:
//!
//! - [`domain`]: Packages, the workspace graph and selection patterns
//! - [`application`]: The filter and run-command use cases
//! - [`infrastructure`]: Manifest discovery and process execution
//! - [`presentation`]: CLI interface
//! - [`common`]: Shared error handling
//!
//! ## Error Handling
//!
//! - [`common::error::WsFilterError`]: Main error type with detailed context
//! - [`common::result::WsFilterResult`]: Type alias for `Result<T, WsFilterError>`
//!
//! ## Examples
//!
//! ```rust,no_run
//! use workspaces_filter::{filter, run_command_on, RunCommandConfig};
//!
//! # async fn example() -> workspaces_filter::Result<()> {
//! let graph = filter(["packages/*"], ["*preset*"], "/path/to/repo").await?;
//!
//! let config = RunCommandConfig::new("/path/to/repo").with_package_manager("pnpm");
//! let report = run_command_on(&["build".to_string()], graph, config).await;
//!
//! for outcome in report.failed_outcomes() {
//!     eprintln!("{} failed", outcome.name);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod application;
pub mod common;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types for convenience
pub use crate::application::use_cases::filter_workspaces::filter;
pub use crate::application::use_cases::run_command::{
    run_command_on, PackageOutcome, RunCommandConfig, RunReport,
};
pub use crate::common::error::WsFilterError;
pub use crate::common::result::WsFilterResult as Result;
pub use crate::domain::entities::{PackageMetadata, WorkspaceGraph};
