use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::error::WsFilterError;
use crate::common::result::WsFilterResult;
use crate::domain::entities::workspace_graph::WorkspaceGraph;
use crate::domain::value_objects::selection_pattern::SelectionPatterns;
use crate::infrastructure::filesystem::manifest_discovery::ManifestDiscovery;

/// Settings for selecting workspace packages
#[derive(Debug, Clone)]
pub struct FilterWorkspacesConfig {
    /// Directory the workspace globs are relative to
    pub base_dir: PathBuf,

    /// Package directory globs, e.g. `packages/*`
    pub workspace_globs: Vec<String>,

    /// Selection patterns matched against package names and directories
    pub patterns: Vec<String>,
}

impl FilterWorkspacesConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            workspace_globs: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn with_workspace_globs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workspace_globs = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the patterns with a single one
    pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
        let pattern: String = pattern.into();
        self.with_patterns([pattern])
    }
}

/// Builds the workspace graph and narrows it to the selected packages
pub struct FilterWorkspacesUseCase {
    config: FilterWorkspacesConfig,
}

impl FilterWorkspacesUseCase {
    pub fn new(config: FilterWorkspacesConfig) -> Self {
        Self { config }
    }

    /// Discover every package, then keep those selected by the patterns.
    ///
    /// Argument errors are returned before the filesystem is touched. An
    /// empty graph means nothing matched and is not an error.
    pub async fn execute(&self) -> WsFilterResult<WorkspaceGraph> {
        if self.config.workspace_globs.iter().all(|g| g.trim().is_empty()) {
            return Err(WsFilterError::invalid_argument(
                "workspace_globs",
                "No workspace globs provided.",
            ));
        }
        let patterns = SelectionPatterns::new(&self.config.patterns)?;
        let discovery =
            ManifestDiscovery::new(&self.config.base_dir, &self.config.workspace_globs)?;

        let graph = Self::discover(&discovery).await?;

        if patterns.selects_everything() {
            debug!(packages = graph.len(), "select-all pattern, skipping filter");
            return Ok(graph);
        }

        let selected = Self::select(&graph, &patterns);
        debug!(
            discovered = graph.len(),
            selected = selected.len(),
            "filtered workspace packages"
        );
        Ok(selected)
    }

    /// Build the full graph from every discovered manifest
    pub async fn discover(discovery: &ManifestDiscovery) -> WsFilterResult<WorkspaceGraph> {
        let mut graph = WorkspaceGraph::new();
        let packages = discovery.packages();
        futures::pin_mut!(packages);

        while let Some(package) = packages.next().await {
            let package = package?;
            let directory = package.directory.clone();
            if let Some(previous) = graph.insert(package) {
                warn!(
                    name = %previous.name,
                    replaced = %previous.directory,
                    by = %directory,
                    "duplicate package name, keeping the last one discovered"
                );
            }
        }

        Ok(graph)
    }

    /// Entries of `graph` matched by any of `patterns`
    pub fn select(graph: &WorkspaceGraph, patterns: &SelectionPatterns) -> WorkspaceGraph {
        graph.retain_matching(|name, meta| patterns.matches(name, &meta.directory))
    }
}

/// Select workspace packages.
///
/// `workspace_globs` are package directory globs relative to `base_dir`;
/// `patterns` select by name or directory, and `.` or `*` selects everything.
///
/// ```rust,no_run
/// # async fn example() -> workspaces_filter::Result<()> {
/// let graph = workspaces_filter::filter(["packages/*"], ["@scope/*"], "/path/to/repo").await?;
/// for name in graph.names() {
///     println!("{name}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn filter<G, GS, P, PS>(
    workspace_globs: G,
    patterns: P,
    base_dir: impl AsRef<Path>,
) -> WsFilterResult<WorkspaceGraph>
where
    G: IntoIterator<Item = GS>,
    GS: Into<String>,
    P: IntoIterator<Item = PS>,
    PS: Into<String>,
{
    let config = FilterWorkspacesConfig::new(base_dir.as_ref())
        .with_workspace_globs(workspace_globs)
        .with_patterns(patterns);
    FilterWorkspacesUseCase::new(config).execute().await
}
