//! `package.json` metadata used by the build.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub typings: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageJson {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::parse(path, e))
    }

    /// Load `package.json` from `dir`, or an empty manifest if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join("package.json");
        if path.is_file() {
            Self::from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Nearest `package.json`, searching `start` and its ancestors.
    pub fn find_upward(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join("package.json"))
            .find(|candidate| candidate.is_file())
    }

    /// `"type": "module"`
    pub fn is_module(&self) -> bool {
        self.package_type.as_deref() == Some("module")
    }

    /// Names of dependencies that are resolved at runtime and therefore never
    /// bundled: `dependencies` plus `peerDependencies`.
    pub fn production_deps(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dependencies
            .keys()
            .chain(self.peer_dependencies.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Hash of the fields whose changes should trigger a rebuild.
    ///
    /// The maps are ordered, so the hash does not depend on key order in the
    /// file and ignores edits to unrelated fields such as `scripts`.
    pub fn dependency_hash(&self) -> String {
        let relevant = serde_json::json!({
            "dependencies": self.dependencies,
            "devDependencies": self.dev_dependencies,
            "peerDependencies": self.peer_dependencies,
        });
        blake3::hash(relevant.to_string().as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PackageJson {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn production_deps_include_peers() {
        let pkg = parse(
            r#"{"dependencies": {"b": "1"}, "peerDependencies": {"a": "1", "b": "1"}, "devDependencies": {"c": "1"}}"#,
        );
        assert_eq!(pkg.production_deps(), vec!["a", "b"]);
    }

    #[test]
    fn dependency_hash_ignores_unrelated_fields() {
        let before = parse(r#"{"scripts": {"build": "a"}, "dependencies": {"x": "1", "y": "2"}}"#);
        let after = parse(r#"{"scripts": {"build": "b"}, "dependencies": {"y": "2", "x": "1"}}"#);
        assert_eq!(before.dependency_hash(), after.dependency_hash());
    }

    #[test]
    fn dependency_hash_changes_with_versions() {
        let before = parse(r#"{"dependencies": {"x": "1"}}"#);
        let after = parse(r#"{"dependencies": {"x": "2"}}"#);
        assert_ne!(before.dependency_hash(), after.dependency_hash());
    }

    #[test]
    fn module_type_detection() {
        assert!(parse(r#"{"type": "module"}"#).is_module());
        assert!(!parse(r#"{"type": "commonjs"}"#).is_module());
        assert!(!parse("{}").is_module());
    }
}
