pub mod package;
pub mod workspace_graph;

pub use package::PackageMetadata;
pub use workspace_graph::WorkspaceGraph;
