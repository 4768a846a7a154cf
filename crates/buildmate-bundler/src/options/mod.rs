//! Canonical build options.
//!
//! [`NormalizedOptions`] is what every later stage reads. It is plain data and
//! serializable, which is also what lets it cross into the declaration worker.

mod extension;
mod normalize;

pub use extension::{OutExtension, default_out_extension};
pub use normalize::normalize;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Cjs,
    Esm,
    Iife,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Cjs => "cjs",
            Format::Esm => "esm",
            Format::Iife => "iife",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cjs" => Ok(Format::Cjs),
            "esm" => Ok(Format::Esm),
            "iife" => Ok(Format::Iife),
            other => Err(format!("unknown format `{other}` (expected cjs, esm or iife)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Node,
    Browser,
    Neutral,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Node => "node",
            Platform::Browser => "browser",
            Platform::Neutral => "neutral",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Platform::Node),
            "browser" => Ok(Platform::Browser),
            "neutral" => Ok(Platform::Neutral),
            other => Err(format!("unknown platform `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    #[default]
    Off,
    External,
    Inline,
}

impl SourceMapMode {
    pub fn enabled(&self) -> bool {
        !matches!(self, SourceMapMode::Off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Minify {
    #[default]
    Off,
    /// Minify inside the bundler.
    Bundler,
    /// Skip bundler minification and run the alternate minifier per chunk.
    Terser,
}

impl Minify {
    pub fn enabled(&self) -> bool {
        !matches!(self, Minify::Off)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    #[default]
    Off,
    /// Watch the working directory; rebuild only for files the last build used.
    All,
    /// Watch these paths; any change rebuilds.
    Paths(Vec<String>),
}

impl WatchMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, WatchMode::Off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KillSignal {
    #[default]
    #[serde(rename = "SIGTERM")]
    Term,
    #[serde(rename = "SIGKILL")]
    Kill,
}

impl FromStr for KillSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGTERM" => Ok(KillSignal::Term),
            "SIGKILL" => Ok(KillSignal::Kill),
            other => Err(format!("unsupported kill signal `{other}` (expected SIGTERM or SIGKILL)")),
        }
    }
}

/// Entry points after resolution. List entries are relative to `cwd` and
/// use forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl Entry {
    pub fn files(&self) -> Vec<&str> {
        match self {
            Entry::List(files) => files.iter().map(String::as_str).collect(),
            Entry::Map(map) => map.values().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Entry::List(files) => files.is_empty(),
            Entry::Map(map) => map.is_empty(),
        }
    }

    /// Named view of the entries. List entries are keyed by file stem.
    pub fn named(&self) -> IndexMap<String, String> {
        match self {
            Entry::Map(map) => map.clone(),
            Entry::List(files) => files
                .iter()
                .map(|file| (file_stem(file), file.clone()))
                .collect(),
        }
    }
}

fn file_stem(file: &str) -> String {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    // `index.d.ts` and `index.test.ts` keep everything before the last dot.
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtsResolve {
    #[default]
    None,
    All,
    Only(Vec<String>),
}

impl DtsResolve {
    pub fn allows(&self, specifier: &str) -> bool {
        match self {
            DtsResolve::None => false,
            DtsResolve::All => true,
            DtsResolve::Only(names) => names.iter().any(|name| {
                specifier == name || specifier.starts_with(&format!("{name}/"))
            }),
        }
    }
}

/// Declaration sub-configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtsConfig {
    pub entry: Option<Entry>,
    pub resolve: DtsResolve,
    pub only: bool,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub compiler_options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Banner {
    pub js: Option<String>,
    pub css: Option<String>,
}

impl Banner {
    pub fn is_empty(&self) -> bool {
        self.js.is_none() && self.css.is_none()
    }
}

/// Canonical configuration for one named target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOptions {
    pub name: Option<String>,
    /// Absolute working directory all relative paths resolve against.
    pub cwd: PathBuf,
    pub entry: Entry,
    pub format: Vec<Format>,
    pub target: Vec<String>,
    pub out_dir: String,
    pub dts: Option<DtsConfig>,
    pub external: Vec<String>,
    pub no_external: Vec<String>,
    pub skip_node_modules_bundle: bool,
    /// `None` disables cleaning; an empty list cleans everything.
    pub clean: Option<Vec<String>>,
    pub watch: WatchMode,
    pub ignore_watch: Vec<String>,
    pub minify: Minify,
    pub minify_whitespace: bool,
    pub minify_identifiers: bool,
    pub minify_syntax: bool,
    pub keep_names: bool,
    pub splitting: Option<bool>,
    pub platform: Platform,
    pub loader: IndexMap<String, String>,
    pub shims: bool,
    pub sourcemap: SourceMapMode,
    pub env: IndexMap<String, String>,
    pub define: IndexMap<String, String>,
    pub inject: Vec<String>,
    pub replace_node_env: bool,
    pub legacy_output: bool,
    pub global_name: Option<String>,
    pub inject_style: bool,
    pub treeshake: bool,
    pub on_success: Option<String>,
    pub kill_signal: KillSignal,
    pub cjs_interop: bool,
    pub silent: bool,
    pub tsconfig: Option<PathBuf>,
    pub tsconfig_resolve_paths: IndexMap<String, Vec<String>>,
    pub tsconfig_decorator_metadata: bool,
    pub banner: Banner,
    pub footer: Banner,
    pub metafile: bool,
    pub jsx_factory: Option<String>,
    pub jsx_fragment: Option<String>,
    pub bundle: bool,
    pub pure: Vec<String>,
}

impl NormalizedOptions {
    /// Defaults for everything except entry and cwd.
    pub fn new(cwd: impl Into<PathBuf>, entry: Entry) -> Self {
        Self {
            name: None,
            cwd: cwd.into(),
            entry,
            format: vec![Format::Cjs],
            target: vec![normalize::DEFAULT_TARGET.to_string()],
            out_dir: normalize::DEFAULT_OUT_DIR.to_string(),
            dts: None,
            external: Vec::new(),
            no_external: Vec::new(),
            skip_node_modules_bundle: false,
            clean: None,
            watch: WatchMode::Off,
            ignore_watch: Vec::new(),
            minify: Minify::Off,
            minify_whitespace: false,
            minify_identifiers: false,
            minify_syntax: false,
            keep_names: false,
            splitting: None,
            platform: Platform::Node,
            loader: IndexMap::new(),
            shims: false,
            sourcemap: SourceMapMode::Off,
            env: IndexMap::new(),
            define: IndexMap::new(),
            inject: Vec::new(),
            replace_node_env: false,
            legacy_output: false,
            global_name: None,
            inject_style: false,
            treeshake: false,
            on_success: None,
            kill_signal: KillSignal::Term,
            cjs_interop: false,
            silent: false,
            tsconfig: None,
            tsconfig_resolve_paths: IndexMap::new(),
            tsconfig_decorator_metadata: false,
            banner: Banner::default(),
            footer: Banner::default(),
            metafile: false,
            jsx_factory: None,
            jsx_fragment: None,
            bundle: true,
            pure: Vec::new(),
        }
    }

    /// Absolute output directory.
    pub fn out_dir_path(&self) -> PathBuf {
        self.cwd.join(&self.out_dir)
    }

    /// Output directory for one format, honoring `legacyOutput`.
    pub fn format_out_dir(&self, format: Format) -> PathBuf {
        if self.legacy_output && format != Format::Cjs {
            self.out_dir_path().join(format.as_str())
        } else {
            self.out_dir_path()
        }
    }

    /// Whether a separate declaration task owns `.d.ts` files.
    pub fn has_dts(&self) -> bool {
        self.dts.is_some()
    }

    pub fn dts_only(&self) -> bool {
        self.dts.as_ref().is_some_and(|dts| dts.only)
    }

    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        self.cwd.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_entries_are_named_by_stem() {
        let entry = Entry::List(vec!["src/index.ts".into(), "src/cli.mts".into()]);
        let named = entry.named();
        assert_eq!(named["index"], "src/index.ts");
        assert_eq!(named["cli"], "src/cli.mts");
    }

    #[test]
    fn legacy_output_nests_non_cjs_formats() {
        let mut opts = NormalizedOptions::new("/p", Entry::List(vec!["a.ts".into()]));
        opts.legacy_output = true;
        assert_eq!(opts.format_out_dir(Format::Cjs), PathBuf::from("/p/dist"));
        assert_eq!(opts.format_out_dir(Format::Esm), PathBuf::from("/p/dist/esm"));
    }

    #[test]
    fn dts_resolve_matches_subpaths() {
        let only = DtsResolve::Only(vec!["@scope/pkg".into()]);
        assert!(only.allows("@scope/pkg"));
        assert!(only.allows("@scope/pkg/sub"));
        assert!(!only.allows("@scope/pkgx"));
        assert!(DtsResolve::All.allows("anything"));
        assert!(!DtsResolve::None.allows("anything"));
    }

    #[test]
    fn worker_facing_options_serialize() {
        let opts = NormalizedOptions::new("/p", Entry::Map(IndexMap::from([(
            "main".to_string(),
            "src/index.ts".to_string(),
        )])));
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["entry"]["main"], "src/index.ts");
        assert_eq!(json["format"], serde_json::json!(["cjs"]));
        let back: NormalizedOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }
}
