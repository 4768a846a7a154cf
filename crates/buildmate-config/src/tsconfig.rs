//! Loading of the project's TypeScript compiler configuration.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::jsonc;

const DEFAULT_FILE: &str = "tsconfig.json";
const MAX_EXTENDS_DEPTH: usize = 16;

/// The subset of `compilerOptions` the build reads, plus the raw object so
/// declaration generation can see everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub paths: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub emit_decorator_metadata: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsConfig {
    pub path: PathBuf,
    pub compiler_options: CompilerOptions,
    /// Merged `compilerOptions` object, after following `extends`.
    pub raw_compiler_options: Map<String, Value>,
}

impl TsConfig {
    /// Locate and load a tsconfig.
    ///
    /// With `explicit`, that file (relative to `cwd`) must exist. Otherwise
    /// `tsconfig.json` is searched from `cwd` upward.
    pub fn load(cwd: &Path, explicit: Option<&str>) -> Result<Self> {
        let path = match explicit {
            Some(file) => {
                let path = cwd.join(file);
                if !path.is_file() {
                    return Err(ConfigError::TsconfigNotFound(path));
                }
                path
            }
            None => cwd
                .ancestors()
                .map(|dir| dir.join(DEFAULT_FILE))
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| ConfigError::TsconfigNotFound(cwd.join(DEFAULT_FILE)))?,
        };

        let raw = load_compiler_options(&path, 0)?;
        let compiler_options = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| ConfigError::parse(&path, e))?;

        Ok(Self {
            path,
            compiler_options,
            raw_compiler_options: raw,
        })
    }

    /// Directory the tsconfig lives in; `paths` are relative to `baseUrl`
    /// inside it.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn base_dir(&self) -> PathBuf {
        match &self.compiler_options.base_url {
            Some(base) => self.dir().join(base),
            None => self.dir().to_path_buf(),
        }
    }
}

fn load_compiler_options(path: &Path, depth: usize) -> Result<Map<String, Value>> {
    if depth > MAX_EXTENDS_DEPTH {
        return Err(ConfigError::InvalidValue {
            field: "extends".to_string(),
            hint: Some(format!("extends chain too deep at {}", path.display())),
        });
    }

    let content = fs::read_to_string(path)?;
    let value: Value = jsonc::from_str(&content).map_err(|e| ConfigError::parse(path, e))?;

    let mut merged = Map::new();
    if let Some(Value::String(parent)) = value.get("extends") {
        // Package-style extends (`@tsconfig/node16`) are not resolved.
        if parent.starts_with('.') {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let mut parent_path = base.join(parent);
            if parent_path.extension().is_none() {
                parent_path.set_extension("json");
            }
            merged = load_compiler_options(&parent_path, depth + 1)?;
        } else {
            tracing::debug!(extends = %parent, "skipping non-relative tsconfig extends");
        }
    }

    if let Some(Value::Object(own)) = value.get("compilerOptions") {
        for (key, val) in own {
            merged.insert(key.clone(), val.clone());
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_commented_tsconfig() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{
                // comment
                "compilerOptions": {
                    "target": "ES2020",
                    "emitDecoratorMetadata": true,
                    "paths": { "@/*": ["src/*"] },
                },
            }"#,
        )
        .unwrap();

        let ts = TsConfig::load(dir.path(), None).unwrap();
        assert_eq!(ts.compiler_options.target.as_deref(), Some("ES2020"));
        assert_eq!(ts.compiler_options.emit_decorator_metadata, Some(true));
        assert_eq!(ts.compiler_options.paths["@/*"], vec!["src/*"]);
    }

    #[test]
    fn follows_relative_extends() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.json"),
            r#"{"compilerOptions": {"target": "es2019", "strict": true}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"extends": "./base", "compilerOptions": {"target": "es2022"}}"#,
        )
        .unwrap();

        let ts = TsConfig::load(dir.path(), None).unwrap();
        assert_eq!(ts.compiler_options.target.as_deref(), Some("es2022"));
        assert_eq!(ts.raw_compiler_options["strict"], Value::Bool(true));
    }

    #[test]
    fn explicit_missing_tsconfig_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = TsConfig::load(dir.path(), Some("tsconfig.build.json")).unwrap_err();
        assert!(matches!(err, ConfigError::TsconfigNotFound(p) if p.ends_with("tsconfig.build.json")));
    }
}
