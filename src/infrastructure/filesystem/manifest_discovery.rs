use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use futures::stream::{self, Stream, StreamExt};
use glob::{MatchOptions, Paths, Pattern};
use tokio::fs as async_fs;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::error::WsFilterError;
use crate::common::result::{OptionExt, WsFilterResult};
use crate::domain::entities::package::PackageMetadata;
use crate::domain::value_objects::selection_pattern::expand_braces;

/// File name of a package manifest
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Paths buffered between the glob walker and the manifest readers
const DISCOVERY_CHANNEL_CAPACITY: usize = 64;

/// Manifests read concurrently while discovery continues
const CONCURRENT_READS: usize = 16;

/// Wildcards never enter hidden directories such as `packages/.cache`
const WALK_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Finds `package.json` files directly inside directories matched by
/// workspace globs.
///
/// Globs starting with `!` exclude matching package directories, as in
/// `pnpm-workspace.yaml`. Braces are expanded in both kinds of glob.
#[derive(Debug, Clone)]
pub struct ManifestDiscovery {
    base_dir: PathBuf,
    include: Vec<String>,
    exclude: Vec<Pattern>,
}

impl ManifestDiscovery {
    /// Create a discovery rooted at `base_dir`.
    ///
    /// A relative `base_dir` is resolved against the process working directory
    /// so that discovered paths are always absolute.
    pub fn new<I, S>(base_dir: impl AsRef<Path>, workspace_globs: I) -> WsFilterResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for workspace_glob in workspace_globs {
            let workspace_glob = workspace_glob.as_ref().trim();
            if workspace_glob.is_empty() {
                continue;
            }
            match workspace_glob.strip_prefix('!') {
                Some(negated) => {
                    let negated = negated.strip_prefix("./").unwrap_or(negated);
                    for expanded in expand_braces(negated.trim_end_matches('/')) {
                        let pattern = Pattern::new(&expanded).map_err(|e| {
                            WsFilterError::invalid_argument(
                                "workspace_globs",
                                format!("invalid exclusion '{workspace_glob}': {e}"),
                            )
                        })?;
                        exclude.push(pattern);
                    }
                }
                None => include.extend(expand_braces(workspace_glob.trim_end_matches('/'))),
            }
        }

        if include.is_empty() {
            return Err(WsFilterError::invalid_argument(
                "workspace_globs",
                "No workspace globs provided.",
            ));
        }

        let base_dir = absolute_base(base_dir.as_ref())?;
        Ok(Self {
            base_dir,
            include,
            exclude,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Lazily walk manifest paths. Nothing touches the filesystem until the
    /// iterator is advanced.
    pub fn paths(&self) -> ManifestPaths {
        let escaped_base = Pattern::escape(&self.base_dir.to_string_lossy());
        let patterns = self
            .include
            .iter()
            .map(|workspace_glob| {
                let relative = workspace_glob.strip_prefix("./").unwrap_or(workspace_glob);
                format!("{escaped_base}/{relative}/{MANIFEST_FILE_NAME}")
            })
            .collect();

        ManifestPaths {
            base_dir: self.base_dir.clone(),
            exclude: self.exclude.clone(),
            pending: patterns,
            current: None,
            seen: HashSet::new(),
        }
    }

    /// Walk manifest paths on a blocking thread and hand them over as they
    /// are found. Dropping the receiver stops the walk.
    pub fn spawn_walker(&self) -> mpsc::Receiver<WsFilterResult<PathBuf>> {
        let (tx, rx) = mpsc::channel(DISCOVERY_CHANNEL_CAPACITY);
        let paths = self.paths();

        tokio::task::spawn_blocking(move || {
            for item in paths {
                if tx.blocking_send(item).is_err() {
                    debug!("manifest receiver dropped, stopping discovery");
                    break;
                }
            }
        });

        rx
    }

    /// Stream of parsed packages in discovery order. Reads overlap with the
    /// glob walk but results keep the order the walker produced them in.
    pub fn packages(&self) -> impl Stream<Item = WsFilterResult<PackageMetadata>> + '_ {
        let receiver = self.spawn_walker();

        stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .map(move |item| async move {
            match item {
                Ok(path) => self.read_package(&path).await,
                Err(e) => Err(e),
            }
        })
        .buffered(CONCURRENT_READS)
    }

    /// Read and parse one manifest
    pub async fn read_package(&self, manifest_path: &Path) -> WsFilterResult<PackageMetadata> {
        let content = async_fs::read_to_string(manifest_path)
            .await
            .map_err(|e| WsFilterError::manifest_read(manifest_path, e))?;

        let package_root = manifest_path.parent().ok_or_internal_error(format!(
            "manifest path has no parent directory: {}",
            manifest_path.display()
        ))?;
        let directory = relative_directory(&self.base_dir, package_root);
        debug!(manifest = %manifest_path.display(), directory = %directory, "read manifest");

        PackageMetadata::from_manifest_str(&content, manifest_path, directory)
    }
}

/// Iterator over absolute manifest paths produced by [`ManifestDiscovery::paths`]
pub struct ManifestPaths {
    base_dir: PathBuf,
    exclude: Vec<Pattern>,
    pending: VecDeque<String>,
    current: Option<Paths>,
    seen: HashSet<PathBuf>,
}

impl ManifestPaths {
    fn is_excluded(&self, manifest_path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        let package_root = manifest_path.parent().unwrap_or(manifest_path);
        let directory = relative_directory(&self.base_dir, package_root);
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.exclude
            .iter()
            .any(|pattern| pattern.matches_with(&directory, options))
    }
}

impl Iterator for ManifestPaths {
    type Item = WsFilterResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(paths) = self.current.as_mut() {
                match paths.next() {
                    Some(Ok(path)) => {
                        if !path.is_file() || self.is_excluded(&path) {
                            continue;
                        }
                        if self.seen.insert(path.clone()) {
                            return Some(Ok(path));
                        }
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(path = %e.path().display(), error = %e.error(), "skipping unreadable path");
                        continue;
                    }
                    None => self.current = None,
                }
            }

            let pattern = self.pending.pop_front()?;
            debug!(pattern = %pattern, "searching for manifests");
            match glob::glob_with(&pattern, WALK_OPTIONS) {
                Ok(paths) => self.current = Some(paths),
                Err(e) => {
                    return Some(Err(WsFilterError::invalid_argument(
                        "workspace_globs",
                        format!("invalid workspace glob '{pattern}': {e}"),
                    )))
                }
            }
        }
    }
}

fn absolute_base(base_dir: &Path) -> WsFilterResult<PathBuf> {
    if base_dir.is_absolute() {
        return Ok(base_dir.to_path_buf());
    }
    let current = std::env::current_dir().map_err(|e| {
        WsFilterError::workspace_config_with_source(
            "cannot resolve relative base directory",
            Some(base_dir.to_path_buf()),
            e,
        )
    })?;
    Ok(current.join(base_dir))
}

/// `path` relative to `base`, with `/` separators on every platform
pub fn relative_directory(base: &Path, path: &Path) -> String {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::fs;
    use tempfile::TempDir;

    fn write_package(root: &Path, dir: &str, body: &str) {
        let package_dir = root.join(dir);
        fs::create_dir_all(&package_dir).unwrap();
        fs::write(package_dir.join(MANIFEST_FILE_NAME), body).unwrap();
    }

    #[test]
    fn test_requires_workspace_globs() {
        let temp_dir = TempDir::new().unwrap();
        let error = ManifestDiscovery::new(temp_dir.path(), Vec::<String>::new()).unwrap_err();
        assert!(error.is_invalid_argument());

        let error = ManifestDiscovery::new(temp_dir.path(), ["!packages/skip"]).unwrap_err();
        assert!(error.is_invalid_argument());
    }

    #[test]
    fn test_paths_are_absolute_and_direct_children_only() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/a", r#"{"name":"a"}"#);
        write_package(temp_dir.path(), "packages/a/nested", r#"{"name":"nested"}"#);
        fs::create_dir_all(temp_dir.path().join("packages/empty")).unwrap();

        let discovery = ManifestDiscovery::new(temp_dir.path(), ["packages/*"]).unwrap();
        let paths: Vec<PathBuf> = discovery.paths().collect::<Result<_, _>>().unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_absolute());
        assert!(paths[0].ends_with("packages/a/package.json"));
    }

    #[test]
    fn test_overlapping_globs_yield_each_manifest_once() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/a", r#"{"name":"a"}"#);

        let discovery =
            ManifestDiscovery::new(temp_dir.path(), ["packages/*", "./packages/a/"]).unwrap();
        assert_eq!(discovery.paths().count(), 1);
    }

    #[test]
    fn test_exclusion_globs() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/a", r#"{"name":"a"}"#);
        write_package(temp_dir.path(), "packages/fixture-b", r#"{"name":"b"}"#);

        let discovery =
            ManifestDiscovery::new(temp_dir.path(), ["packages/*", "!packages/fixture-*"]).unwrap();
        let paths: Vec<PathBuf> = discovery.paths().collect::<Result<_, _>>().unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("packages/a/package.json"));
    }

    #[test]
    fn test_brace_workspace_globs() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/foo", r#"{"name":"foo"}"#);
        write_package(temp_dir.path(), "packages/bar", r#"{"name":"bar"}"#);
        write_package(temp_dir.path(), "packages/baz", r#"{"name":"baz"}"#);

        let globs = ["packages/{foo,bar}", "packages/{bar,baz}", "!packages/{baz,qux}"];
        let discovery = ManifestDiscovery::new(temp_dir.path(), globs).unwrap();
        let mut paths: Vec<PathBuf> = discovery.paths().collect::<Result<_, _>>().unwrap();
        paths.sort();

        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("packages/bar/package.json"));
        assert!(paths[1].ends_with("packages/foo/package.json"));
    }

    #[test]
    fn test_hidden_directories_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/a", r#"{"name":"a"}"#);
        write_package(temp_dir.path(), "packages/.cache", r#"{"name":"cached"}"#);

        let discovery = ManifestDiscovery::new(temp_dir.path(), ["packages/*"]).unwrap();
        let paths: Vec<PathBuf> = discovery.paths().collect::<Result<_, _>>().unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("packages/a/package.json"));

        let explicit = ManifestDiscovery::new(temp_dir.path(), ["packages/.cache"]).unwrap();
        assert_eq!(explicit.paths().count(), 1);
    }

    #[test]
    fn test_relative_directory_uses_forward_slashes() {
        let base = Path::new("/repo");
        assert_eq!(
            relative_directory(base, Path::new("/repo/packages/foo")),
            "packages/foo"
        );
        assert_eq!(relative_directory(base, Path::new("/repo")), "");
    }

    #[tokio::test]
    async fn test_packages_stream_reads_manifests() {
        let temp_dir = TempDir::new().unwrap();
        write_package(
            temp_dir.path(),
            "packages/foo",
            r#"{"name":"@scope/foo","version":"1.0.0"}"#,
        );
        write_package(temp_dir.path(), "packages/bar", r#"{"name":"@scope/bar"}"#);

        let discovery = ManifestDiscovery::new(temp_dir.path(), ["packages/*"]).unwrap();
        let mut packages: Vec<PackageMetadata> =
            discovery.packages().try_collect().await.unwrap();
        packages.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "@scope/bar");
        assert_eq!(packages[0].directory, "packages/bar");
        assert_eq!(packages[0].version, "0.0.0");
        assert_eq!(packages[1].version, "1.0.0");
    }

    #[tokio::test]
    async fn test_unparsable_manifest_fails_stream() {
        let temp_dir = TempDir::new().unwrap();
        write_package(temp_dir.path(), "packages/broken", "{ nope");

        let discovery = ManifestDiscovery::new(temp_dir.path(), ["packages/*"]).unwrap();
        let result: WsFilterResult<Vec<PackageMetadata>> =
            discovery.packages().try_collect().await;

        assert!(matches!(result, Err(WsFilterError::ManifestParse { .. })));
    }
}
