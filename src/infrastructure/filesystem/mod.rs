pub mod manifest_discovery;
pub mod root_manifest;

pub use manifest_discovery::{ManifestDiscovery, ManifestPaths, MANIFEST_FILE_NAME};
pub use root_manifest::{resolve_workspace, RootManifest, WorkspaceSettings};
