//! Raw build options as they appear in config files and on the command line.
//!
//! Every field is optional and most accept more than one shape (a boolean or a
//! string, one value or a list). Turning these into a canonical build
//! configuration is the normalizer's job; this module only describes what users
//! are allowed to write.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value that may be written either once or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Entry points: a single file, a list of files/globs, or named aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryInput {
    One(String),
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

/// `dts: true`, `dts: "src/types.ts"` or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DtsInput {
    Enabled(bool),
    Entry(String),
    Config(DtsOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DtsOptions {
    pub entry: Option<EntryInput>,
    pub resolve: Option<DtsResolveInput>,
    pub only: Option<bool>,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub compiler_options: Option<serde_json::Map<String, serde_json::Value>>,
}

/// `resolve: true` follows every resolvable import, a list restricts it to
/// the named modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DtsResolveInput {
    All(bool),
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinifyInput {
    Enabled(bool),
    /// An alternate minifier by name (currently only `"terser"`).
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcemapInput {
    Enabled(bool),
    /// `"inline"`
    Mode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WatchInput {
    Enabled(bool),
    Path(String),
    Paths(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CleanInput {
    Enabled(bool),
    Patterns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeshakeInput {
    Enabled(bool),
    Preset(String),
}

/// Text placed before or after emitted code, per output language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerInput {
    pub js: Option<String>,
    pub css: Option<String>,
}

/// User options for one build target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Display name; prefixes every log line for this target.
    pub name: Option<String>,
    pub entry: Option<EntryInput>,
    pub format: Option<OneOrMany<String>>,
    pub target: Option<OneOrMany<String>>,
    pub out_dir: Option<String>,
    pub dts: Option<DtsInput>,
    pub external: Option<Vec<String>>,
    pub no_external: Option<Vec<String>>,
    pub skip_node_modules_bundle: Option<bool>,
    pub clean: Option<CleanInput>,
    pub watch: Option<WatchInput>,
    pub ignore_watch: Option<OneOrMany<String>>,
    pub minify: Option<MinifyInput>,
    pub minify_whitespace: Option<bool>,
    pub minify_identifiers: Option<bool>,
    pub minify_syntax: Option<bool>,
    pub keep_names: Option<bool>,
    pub splitting: Option<bool>,
    pub platform: Option<String>,
    pub loader: Option<IndexMap<String, String>>,
    pub shims: Option<bool>,
    pub sourcemap: Option<SourcemapInput>,
    pub env: Option<IndexMap<String, String>>,
    pub define: Option<IndexMap<String, String>>,
    pub inject: Option<Vec<String>>,
    pub replace_node_env: Option<bool>,
    pub legacy_output: Option<bool>,
    pub global_name: Option<String>,
    pub inject_style: Option<bool>,
    pub treeshake: Option<TreeshakeInput>,
    pub on_success: Option<String>,
    pub kill_signal: Option<String>,
    pub cjs_interop: Option<bool>,
    pub silent: Option<bool>,
    pub tsconfig: Option<String>,
    pub banner: Option<BannerInput>,
    pub footer: Option<BannerInput>,
    pub metafile: Option<bool>,
    pub jsx_factory: Option<String>,
    pub jsx_fragment: Option<String>,
    pub bundle: Option<bool>,
    pub pure: Option<Vec<String>>,
}

macro_rules! override_fields {
    ($base:ident, $over:ident; $($field:ident),* $(,)?) => {
        $(
            if $over.$field.is_some() {
                $base.$field = $over.$field;
            }
        )*
    };
}

impl Options {
    /// Shallow merge: every field set in `overrides` replaces the one in `self`.
    ///
    /// Nested values (maps, lists, the `dts` object) are replaced whole, never
    /// merged key by key.
    pub fn merge(mut self, overrides: Options) -> Options {
        override_fields!(self, overrides;
            name, entry, format, target, out_dir, dts, external, no_external,
            skip_node_modules_bundle, clean, watch, ignore_watch, minify,
            minify_whitespace, minify_identifiers, minify_syntax, keep_names,
            splitting, platform, loader, shims, sourcemap, env, define, inject,
            replace_node_env, legacy_output, global_name, inject_style, treeshake,
            on_success, kill_signal, cjs_interop, silent, tsconfig, banner, footer,
            metafile, jsx_factory, jsx_fragment, bundle, pure,
        );
        self
    }
}
