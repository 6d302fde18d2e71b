//! Common test utilities and helpers
//!
//! Builds throwaway monorepos on disk that the integration tests select from
//! and run commands in.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture for a monorepo with four packages under `packages/`
pub struct MonorepoFixture {
    temp_dir: TempDir,
}

impl MonorepoFixture {
    /// `@scope/foo`, `@scope/bar`, `baz-utils` and `baz-preset`, declared
    /// through a plain `workspaces` list
    pub fn new() -> Self {
        let fixture = Self::empty(r#"{ "name": "monorepo", "private": true, "workspaces": ["packages/*"] }"#);
        fixture.add_package(
            "packages/foo",
            r#"{ "name": "@scope/foo", "version": "1.0.0", "license": "MIT", "scripts": { "test": "echo foo" } }"#,
        );
        fixture.add_package(
            "packages/bar",
            r#"{ "name": "@scope/bar", "version": "2.1.0", "scripts": { "build": "echo bar" }, "dependencies": { "@scope/foo": "workspace:*" } }"#,
        );
        fixture.add_package(
            "packages/baz-utils",
            r#"{ "name": "baz-utils", "version": "0.2.3", "scripts": { "dev": "echo bazutils" } }"#,
        );
        fixture.add_package(
            "packages/baz-preset",
            r#"{ "name": "baz-preset", "version": "0.1.0", "exports": "./index.js" }"#,
        );
        fixture
    }

    /// Only a root `package.json` with the given content
    pub fn empty(root_manifest: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("package.json"), root_manifest)
            .expect("Failed to write root manifest");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn package_dir(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    /// Write `<relative>/package.json`
    pub fn add_package(&self, relative: &str, manifest: &str) {
        let dir = self.package_dir(relative);
        fs::create_dir_all(&dir).expect("Failed to create package directory");
        fs::write(dir.join("package.json"), manifest).expect("Failed to write manifest");
    }

    /// Write an arbitrary file relative to the repository root
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.package_dir(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(path, content).expect("Failed to write file");
    }
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
