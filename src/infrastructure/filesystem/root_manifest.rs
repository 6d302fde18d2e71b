use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::debug;

use super::manifest_discovery::MANIFEST_FILE_NAME;
use crate::common::error::WsFilterError;
use crate::common::result::WsFilterResult;

/// Package manager used when nothing else is configured
pub const DEFAULT_PACKAGE_MANAGER: &str = "bun";

/// Workspace file read instead of `package.json` when the package manager is pnpm
pub const PNPM_WORKSPACE_FILE_NAME: &str = "pnpm-workspace.yaml";

/// Packages list as found under `workspaces` / `workspace`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkspacesObject {
    #[serde(default)]
    pub packages: Vec<String>,
}

/// `workspaces` is either a plain list (npm, yarn) or an object with a
/// `packages` list (bun, yarn with nohoist)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    List(Vec<String>),
    Object(WorkspacesObject),
}

/// The root `package.json` of a monorepo
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "packageManager")]
    pub package_manager: Option<String>,

    #[serde(default)]
    pub workspaces: Option<WorkspacesField>,

    #[serde(default)]
    pub workspace: Option<WorkspacesObject>,
}

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspaceFile {
    #[serde(default)]
    packages: Vec<String>,
}

/// Workspace settings resolved for a CLI run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    /// Package manager binary used for scripts
    pub package_manager: String,

    /// Globs of package directories; may be empty
    pub workspace_globs: Vec<String>,

    /// File the globs were read from
    pub source: PathBuf,
}

impl RootManifest {
    /// Parse a root manifest from JSON text
    pub fn from_json_str(content: &str, path: &Path) -> WsFilterResult<Self> {
        serde_json::from_str(content).map_err(|e| WsFilterError::manifest_parse(path, e))
    }

    /// Load `<base_dir>/package.json`
    pub async fn load(base_dir: &Path) -> WsFilterResult<Self> {
        let path = base_dir.join(MANIFEST_FILE_NAME);
        let content = async_fs::read_to_string(&path)
            .await
            .map_err(|e| WsFilterError::manifest_read(&path, e))?;
        Self::from_json_str(&content, &path)
    }

    /// Package manager name from the `packageManager` field (`pnpm@9.1.0` -> `pnpm`)
    pub fn package_manager_name(&self) -> Option<String> {
        self.package_manager
            .as_deref()
            .and_then(|pm| pm.split('@').next())
            .map(str::trim)
            .filter(|pm| !pm.is_empty())
            .map(str::to_string)
    }

    /// Workspace globs; the object forms take precedence over a plain list
    pub fn workspace_globs(&self) -> Vec<String> {
        match (&self.workspaces, &self.workspace) {
            (Some(WorkspacesField::Object(object)), _) if !object.packages.is_empty() => {
                object.packages.clone()
            }
            (_, Some(object)) if !object.packages.is_empty() => object.packages.clone(),
            (Some(WorkspacesField::List(list)), _) => list.clone(),
            _ => Vec::new(),
        }
    }
}

/// Read the `packages` list of `pnpm-workspace.yaml` in `base_dir`
pub async fn load_pnpm_workspace_globs(base_dir: &Path) -> WsFilterResult<Vec<String>> {
    let path = base_dir.join(PNPM_WORKSPACE_FILE_NAME);
    let content = async_fs::read_to_string(&path).await.map_err(|e| {
        WsFilterError::workspace_config_with_source(
            format!("cannot read {PNPM_WORKSPACE_FILE_NAME}"),
            Some(path.clone()),
            e,
        )
    })?;
    parse_pnpm_workspace(&content, &path)
}

fn parse_pnpm_workspace(content: &str, path: &Path) -> WsFilterResult<Vec<String>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: PnpmWorkspaceFile = serde_yaml::from_str(content).map_err(|e| {
        WsFilterError::workspace_config_with_source(
            format!("invalid {PNPM_WORKSPACE_FILE_NAME}"),
            Some(path.to_path_buf()),
            e,
        )
    })?;
    Ok(file.packages)
}

/// Resolve package manager and workspace globs for `base_dir`.
///
/// The package manager comes from `package_manager_override`, then the root
/// manifest's `packageManager` field, then [`DEFAULT_PACKAGE_MANAGER`].
pub async fn resolve_workspace(
    base_dir: &Path,
    package_manager_override: Option<&str>,
) -> WsFilterResult<WorkspaceSettings> {
    let root = RootManifest::load(base_dir).await?;

    let package_manager = package_manager_override
        .map(str::to_string)
        .or_else(|| root.package_manager_name())
        .unwrap_or_else(|| DEFAULT_PACKAGE_MANAGER.to_string());

    let (workspace_globs, source) = if package_manager == "pnpm" {
        (
            load_pnpm_workspace_globs(base_dir).await?,
            base_dir.join(PNPM_WORKSPACE_FILE_NAME),
        )
    } else {
        (root.workspace_globs(), base_dir.join(MANIFEST_FILE_NAME))
    };

    debug!(
        package_manager = %package_manager,
        globs = ?workspace_globs,
        source = %source.display(),
        "resolved workspace settings"
    );

    Ok(WorkspaceSettings {
        package_manager,
        workspace_globs,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn root(json: &str) -> RootManifest {
        RootManifest::from_json_str(json, Path::new("package.json")).unwrap()
    }

    #[test]
    fn test_workspaces_list() {
        let manifest = root(r#"{ "name": "root", "workspaces": ["packages/*", "apps/*"] }"#);
        assert_eq!(manifest.workspace_globs(), vec!["packages/*", "apps/*"]);
    }

    #[test]
    fn test_workspaces_object_forms() {
        let bun = root(r#"{ "workspaces": { "packages": ["packages/*"], "catalog": {} } }"#);
        assert_eq!(bun.workspace_globs(), vec!["packages/*"]);

        let singular = root(r#"{ "workspace": { "packages": ["libs/*"] } }"#);
        assert_eq!(singular.workspace_globs(), vec!["libs/*"]);

        let none = root(r#"{ "name": "solo" }"#);
        assert!(none.workspace_globs().is_empty());
    }

    #[test]
    fn test_package_manager_name() {
        assert_eq!(
            root(r#"{ "packageManager": "pnpm@9.1.0" }"#).package_manager_name(),
            Some("pnpm".to_string())
        );
        assert_eq!(
            root(r#"{ "packageManager": "yarn" }"#).package_manager_name(),
            Some("yarn".to_string())
        );
        assert_eq!(root("{}").package_manager_name(), None);
    }

    #[test]
    fn test_parse_pnpm_workspace() {
        let globs = parse_pnpm_workspace(
            "packages:\n  - 'packages/*'\n  - '!**/test/**'\n",
            Path::new(PNPM_WORKSPACE_FILE_NAME),
        )
        .unwrap();
        assert_eq!(globs, vec!["packages/*", "!**/test/**"]);

        assert!(parse_pnpm_workspace("", Path::new("x")).unwrap().is_empty());
        assert!(parse_pnpm_workspace("packages: [", Path::new("x")).is_err());
    }

    #[tokio::test]
    async fn test_resolve_workspace_defaults_to_bun() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("package.json"),
            r#"{ "name": "root", "workspaces": ["packages/*"] }"#,
        )
        .unwrap();

        let settings = resolve_workspace(temp_dir.path(), None).await.unwrap();
        assert_eq!(settings.package_manager, "bun");
        assert_eq!(settings.workspace_globs, vec!["packages/*"]);

        let settings = resolve_workspace(temp_dir.path(), Some("npm")).await.unwrap();
        assert_eq!(settings.package_manager, "npm");
    }

    #[tokio::test]
    async fn test_resolve_workspace_pnpm() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("package.json"),
            r#"{ "name": "root", "packageManager": "pnpm@9.0.0" }"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join(PNPM_WORKSPACE_FILE_NAME),
            "packages:\n  - libs/*\n",
        )
        .unwrap();

        let settings = resolve_workspace(temp_dir.path(), None).await.unwrap();
        assert_eq!(settings.package_manager, "pnpm");
        assert_eq!(settings.workspace_globs, vec!["libs/*"]);
    }

    #[tokio::test]
    async fn test_missing_root_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let error = resolve_workspace(temp_dir.path(), None).await.unwrap_err();
        assert!(matches!(error, WsFilterError::ManifestRead { .. }));
    }
}
