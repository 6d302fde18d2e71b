use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::package::PackageMetadata;

/// Workspace packages keyed by package name
///
/// A graph is built once per selection and then only read. Inserting a
/// package whose name is already present replaces the previous entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceGraph {
    packages: BTreeMap<String, PackageMetadata>,
}

impl WorkspaceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a package under its name, returning the entry it replaced
    pub fn insert(&mut self, package: PackageMetadata) -> Option<PackageMetadata> {
        self.packages.insert(package.name.clone(), package)
    }

    /// Add a package (builder style)
    pub fn with_package(mut self, package: PackageMetadata) -> Self {
        self.insert(package);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PackageMetadata> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate `(name, metadata)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PackageMetadata)> {
        self.packages.iter()
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageMetadata> {
        self.packages.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    pub fn directories(&self) -> Vec<&str> {
        self.packages
            .values()
            .map(|p| p.directory.as_str())
            .collect()
    }

    /// New graph holding clones of the entries accepted by `predicate`
    pub fn retain_matching<F>(&self, mut predicate: F) -> WorkspaceGraph
    where
        F: FnMut(&str, &PackageMetadata) -> bool,
    {
        let packages = self
            .packages
            .iter()
            .filter(|(name, meta)| predicate(name, meta))
            .map(|(name, meta)| (name.clone(), meta.clone()))
            .collect();
        Self { packages }
    }
}

impl FromIterator<PackageMetadata> for WorkspaceGraph {
    fn from_iter<I: IntoIterator<Item = PackageMetadata>>(iter: I) -> Self {
        let mut graph = WorkspaceGraph::new();
        for package in iter {
            graph.insert(package);
        }
        graph
    }
}

impl IntoIterator for WorkspaceGraph {
    type Item = (String, PackageMetadata);
    type IntoIter = std::collections::btree_map::IntoIter<String, PackageMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.into_iter()
    }
}
