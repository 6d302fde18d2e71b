use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::error::WsFilterError;
use crate::common::result::WsFilterResult;

/// Version used when a manifest omits `version`
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Metadata of a single workspace package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package directory relative to the base directory
    #[serde(rename = "dir")]
    pub directory: String,

    /// Package name; the key of the package in a workspace graph
    pub name: String,

    /// Semantic version string
    pub version: String,

    /// License identifier (empty when absent)
    pub license: String,

    /// `exports` field flattened to subpath -> target
    pub exports: BTreeMap<String, String>,

    /// `scripts` field
    pub scripts: BTreeMap<String, String>,

    /// `dependencies` field
    pub dependencies: BTreeMap<String, String>,
}

/// Raw `package.json` shape; only the fields the graph needs
#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    version: Option<String>,

    #[serde(default)]
    license: Option<Value>,

    #[serde(default)]
    exports: Option<Value>,

    #[serde(default)]
    scripts: Option<BTreeMap<String, String>>,

    #[serde(default)]
    dependencies: Option<BTreeMap<String, String>>,
}

impl PackageMetadata {
    /// Create metadata with defaults for every optional field
    pub fn new(name: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
            version: DEFAULT_VERSION.to_string(),
            license: String::new(),
            exports: BTreeMap::new(),
            scripts: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a script
    pub fn with_script(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), command.into());
        self
    }

    /// Add a dependency
    pub fn with_dependency(mut self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), range.into());
        self
    }

    /// Parse a `package.json` document.
    ///
    /// `manifest_path` is only used for error reporting; `directory` becomes
    /// [`PackageMetadata::directory`] verbatim.
    pub fn from_manifest_str(
        content: &str,
        manifest_path: &Path,
        directory: impl Into<String>,
    ) -> WsFilterResult<Self> {
        let raw: RawManifest = serde_json::from_str(content)
            .map_err(|e| WsFilterError::manifest_parse(manifest_path, e))?;

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| WsFilterError::MissingPackageName {
                path: manifest_path.to_path_buf(),
            })?;

        Ok(Self {
            directory: directory.into(),
            name,
            version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            license: raw.license.map(value_to_string).unwrap_or_default(),
            exports: raw.exports.map(normalize_exports).unwrap_or_default(),
            scripts: raw.scripts.unwrap_or_default(),
            dependencies: raw.dependencies.unwrap_or_default(),
        })
    }

    /// Whether `script` is declared in `scripts`
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }
}

/// `"exports": "./index.js"` is shorthand for `{ ".": "./index.js" }`
fn normalize_exports(exports: Value) -> BTreeMap<String, String> {
    match exports {
        Value::Null => BTreeMap::new(),
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, value)| (key, value_to_string(value)))
            .collect(),
        other => BTreeMap::from([(".".to_string(), value_to_string(other))]),
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> WsFilterResult<PackageMetadata> {
        PackageMetadata::from_manifest_str(
            content,
            Path::new("packages/foo/package.json"),
            "packages/foo",
        )
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let meta = parse(r#"{ "name": "@scope/foo" }"#).unwrap();

        assert_eq!(meta, PackageMetadata::new("@scope/foo", "packages/foo"));
        assert_eq!(meta.version, "0.0.0");
        assert!(meta.license.is_empty());
    }

    #[test]
    fn test_full_manifest() {
        let meta = parse(
            r#"{
                "name": "baz-utils",
                "version": "0.2.3",
                "license": "MIT",
                "exports": { ".": "./index.js", "./package.json": "./package.json" },
                "scripts": { "dev": "echo bazutils" },
                "dependencies": { "picomatch": "^4.0.0" },
                "private": true
            }"#,
        )
        .unwrap();

        assert_eq!(meta.version, "0.2.3");
        assert_eq!(meta.license, "MIT");
        assert_eq!(meta.exports.len(), 2);
        assert!(meta.has_script("dev"));
        assert!(!meta.has_script("build"));
        assert_eq!(meta.dependencies.get("picomatch").unwrap(), "^4.0.0");
    }

    #[test]
    fn test_string_and_conditional_exports() {
        let meta = parse(r#"{ "name": "a", "exports": "./main.js" }"#).unwrap();
        assert_eq!(meta.exports.get(".").unwrap(), "./main.js");

        let meta = parse(
            r#"{ "name": "a", "exports": { ".": { "import": "./a.mjs" } } }"#,
        )
        .unwrap();
        assert_eq!(meta.exports.get(".").unwrap(), r#"{"import":"./a.mjs"}"#);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let error = parse(r#"{ "version": "1.0.0" }"#).unwrap_err();
        assert!(matches!(error, WsFilterError::MissingPackageName { .. }));

        let error = parse(r#"{ "name": "  " }"#).unwrap_err();
        assert!(matches!(error, WsFilterError::MissingPackageName { .. }));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let error = parse("{ not json").unwrap_err();
        assert!(matches!(error, WsFilterError::ManifestParse { .. }));
    }

    #[test]
    fn test_serializes_directory_as_dir() {
        let meta = PackageMetadata::new("a", "packages/a");
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["dir"], "packages/a");
        assert_eq!(json["version"], "0.0.0");
    }
}
