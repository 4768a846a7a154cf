//! File-based config discovery.
//!
//! Looks for a build-mate config file starting at a directory and walking up
//! to the filesystem root, then loads it into one or more [`Options`] targets.

use std::fs;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Json, Toml};
use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::jsonc;
use crate::options::Options;

/// Config file names, in lookup order within one directory.
pub const CONFIG_FILES: &[&str] = &["build-mate.config.json", "build-mate.config.toml"];

/// Key holding build-mate options inside `package.json`.
pub const PACKAGE_KEY: &str = "build-mate";

/// A loaded config file.
///
/// A file may describe a single target (an object) or several named targets
/// (a JSON array of objects).
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub targets: Vec<Options>,
}

impl LoadedConfig {
    /// Config used when discovery is disabled or finds nothing.
    pub fn empty() -> Self {
        Self {
            path: None,
            targets: vec![Options::default()],
        }
    }
}

pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find the nearest config file, searching `root` and then its ancestors.
    ///
    /// In each directory the dedicated config files are tried first, then a
    /// `package.json` carrying a `"build-mate"` key.
    pub fn find(&self) -> Option<PathBuf> {
        self.root.ancestors().find_map(find_in_dir)
    }

    /// Discover and load a config. Returns [`LoadedConfig::empty`] when no
    /// file exists.
    pub fn load(&self) -> Result<LoadedConfig> {
        match self.find() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                load_from(&path)
            }
            None => Ok(LoadedConfig::empty()),
        }
    }

    /// Load an explicitly named config file, relative to `root`.
    pub fn load_explicit(&self, file: impl AsRef<Path>) -> Result<LoadedConfig> {
        let path = self.root.join(file.as_ref());
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        load_from(&path)
    }
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    for name in CONFIG_FILES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let pkg_path = dir.join("package.json");
    let content = fs::read_to_string(&pkg_path).ok()?;
    let parsed: Value = serde_json::from_str(&content).ok()?;
    match parsed.get(PACKAGE_KEY) {
        Some(value) if !value.is_null() => Some(pkg_path),
        _ => None,
    }
}

/// Load config targets from a specific file.
pub fn load_from(path: &Path) -> Result<LoadedConfig> {
    let is_package_json = path.file_name().is_some_and(|name| name == "package.json");
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();

    let targets = match extension {
        "json" => load_json(path, is_package_json)?,
        "toml" => {
            let options: Options = Figment::from(Toml::file(path)).extract()?;
            vec![options]
        }
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    Ok(LoadedConfig {
        path: Some(path.to_path_buf()),
        targets,
    })
}

fn load_json(path: &Path, is_package_json: bool) -> Result<Vec<Options>> {
    let content = fs::read_to_string(path)?;
    let stripped = jsonc::strip(&content);
    let value: Value = serde_json::from_str(&stripped).map_err(|e| ConfigError::parse(path, e))?;

    let data = if is_package_json {
        value.get(PACKAGE_KEY).cloned().unwrap_or(Value::Null)
    } else {
        value
    };

    match data {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| ConfigError::parse(path, e)))
            .collect(),
        Value::Object(_) => {
            let mut figment = Figment::from(Json::string(&stripped));
            if is_package_json {
                figment = figment.focus(PACKAGE_KEY);
            }
            Ok(vec![figment.extract()?])
        }
        Value::Null => Ok(vec![Options::default()]),
        other => Err(ConfigError::InvalidValue {
            field: path.display().to_string(),
            hint: Some(format!("expected an object or an array of objects, got {other}")),
        }),
    }
}
