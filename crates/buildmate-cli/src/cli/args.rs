use std::path::PathBuf;

use buildmate_config::{
    CleanInput, DtsInput, DtsOptions, DtsResolveInput, EntryInput, MinifyInput,
    OneOrMany, Options, SourcemapInput, TreeshakeInput, WatchInput,
};
use clap::Args;
use indexmap::IndexMap;

use super::parse::{normalize_entry_path, parse_key_value, split_list};

/// Flags of the build command. Every flag is optional; unset flags leave the
/// config file's value in place.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Entry files or glob patterns
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Named entry, e.g. `--entry main=src/index.ts` (repeatable)
    #[arg(long = "entry", value_name = "NAME=PATH", value_parser = parse_key_value)]
    pub entries: Vec<(String, String)>,

    /// Output formats: cjs, esm, iife (comma separated)
    #[arg(long, value_name = "FORMATS")]
    pub format: Vec<String>,

    /// Compile target(s), e.g. `node16,es2020`
    #[arg(long, value_name = "TARGET")]
    pub target: Vec<String>,

    /// Output directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<String>,

    /// Generate declaration files, optionally from a different entry
    #[arg(long, value_name = "ENTRY", num_args = 0..=1)]
    pub dts: Option<Option<String>>,

    /// Follow bare imports that resolve to local sources when generating
    /// declarations
    #[arg(long)]
    pub dts_resolve: bool,

    /// Only generate declaration files
    #[arg(long)]
    pub dts_only: bool,

    /// Keep these modules out of the bundle (comma separated)
    #[arg(long, value_name = "MODULES")]
    pub external: Vec<String>,

    /// Bundle these modules even when they look external
    #[arg(long, value_name = "MODULES")]
    pub no_external: Vec<String>,

    /// Clean the output directory before building
    #[arg(long)]
    pub clean: bool,

    /// Rebuild on change; without a path, watch the files the build used
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    pub watch: Option<Vec<String>>,

    /// Paths to exclude from watching
    #[arg(long, value_name = "PATH")]
    pub ignore_watch: Vec<String>,

    /// Minify output, optionally with an alternate minifier (`terser`)
    #[arg(long, value_name = "MINIFIER", num_args = 0..=1)]
    pub minify: Option<Option<String>>,

    /// Generate source maps, optionally `inline`
    #[arg(long, value_name = "MODE", num_args = 0..=1)]
    pub sourcemap: Option<Option<String>>,

    /// Enable code splitting
    #[arg(long, conflicts_with = "no_splitting")]
    pub splitting: bool,

    /// Disable code splitting
    #[arg(long)]
    pub no_splitting: bool,

    /// Target platform: node, browser or neutral
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<String>,

    /// Define a compile-time env variable, e.g. `--env NODE_ENV=production`
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Replace a global identifier, e.g. `--define DEBUG=false`
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub define: Vec<(String, String)>,

    /// Loader for an extension, e.g. `--loader .png=dataurl`
    #[arg(long, value_name = ".EXT=LOADER", value_parser = parse_key_value)]
    pub loader: Vec<(String, String)>,

    /// Inject a file into every output
    #[arg(long, value_name = "FILE")]
    pub inject: Vec<String>,

    /// Inject `__dirname`/`import.meta.url` shims
    #[arg(long)]
    pub shims: bool,

    /// Global variable name for iife output
    #[arg(long, value_name = "NAME")]
    pub global_name: Option<String>,

    /// Write non-cjs formats into per-format directories
    #[arg(long)]
    pub legacy_output: bool,

    /// Re-bundle output chunks with tree shaking
    #[arg(long)]
    pub treeshake: bool,

    /// Command to run after each successful build
    #[arg(long, value_name = "CMD")]
    pub on_success: Option<String>,

    /// Signal sent to the on-success command: SIGTERM or SIGKILL
    #[arg(long, value_name = "SIGNAL")]
    pub kill_signal: Option<String>,

    /// Make `export default` the module export of cjs entries
    #[arg(long)]
    pub cjs_interop: bool,

    /// Inject CSS into the JavaScript output
    #[arg(long)]
    pub inject_style: bool,

    /// Replace `process.env.NODE_ENV`
    #[arg(long)]
    pub replace_node_env: bool,

    /// Write the bundler metafile for each format
    #[arg(long)]
    pub metafile: bool,

    /// Suppress non-error output
    #[arg(long)]
    pub silent: bool,

    /// Path to tsconfig.json
    #[arg(long, value_name = "FILE")]
    pub tsconfig: Option<String>,

    /// Target name shown in log lines
    #[arg(long)]
    pub name: Option<String>,

    /// Use this config file
    #[arg(long, value_name = "PATH", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Do not look for a config file
    #[arg(long)]
    pub no_config: bool,
}

/// Where the config file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Discover,
    Explicit(PathBuf),
    Disabled,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

fn pairs(values: &[(String, String)]) -> Option<IndexMap<String, String>> {
    non_empty(values.to_vec()).map(|v| v.into_iter().collect())
}

impl BuildArgs {
    pub fn config_source(&self) -> ConfigSource {
        if self.no_config {
            ConfigSource::Disabled
        } else if let Some(path) = &self.config {
            ConfigSource::Explicit(path.clone())
        } else {
            ConfigSource::Discover
        }
    }

    /// The options these flags set, to be merged over the config file.
    pub fn to_overrides(&self) -> Options {
        Options {
            name: self.name.clone(),
            entry: self.entry(),
            format: non_empty(split_list(&self.format)).map(OneOrMany::Many),
            target: non_empty(split_list(&self.target)).map(OneOrMany::Many),
            out_dir: self.out_dir.clone(),
            dts: self.dts(),
            external: non_empty(split_list(&self.external)),
            no_external: non_empty(split_list(&self.no_external)),
            clean: flag(self.clean).map(CleanInput::Enabled),
            watch: self.watch(),
            ignore_watch: non_empty(self.ignore_watch.clone()).map(OneOrMany::Many),
            minify: self.minify.clone().map(|named| match named {
                Some(name) => MinifyInput::Named(name),
                None => MinifyInput::Enabled(true),
            }),
            splitting: if self.splitting {
                Some(true)
            } else if self.no_splitting {
                Some(false)
            } else {
                None
            },
            platform: self.platform.clone(),
            loader: pairs(&self.loader),
            shims: flag(self.shims),
            sourcemap: self.sourcemap.clone().map(|mode| match mode {
                Some(mode) => SourcemapInput::Mode(mode),
                None => SourcemapInput::Enabled(true),
            }),
            env: pairs(&self.env),
            define: pairs(&self.define),
            inject: non_empty(self.inject.clone()),
            replace_node_env: flag(self.replace_node_env),
            legacy_output: flag(self.legacy_output),
            global_name: self.global_name.clone(),
            inject_style: flag(self.inject_style),
            treeshake: flag(self.treeshake).map(TreeshakeInput::Enabled),
            on_success: self.on_success.clone(),
            kill_signal: self.kill_signal.clone(),
            cjs_interop: flag(self.cjs_interop),
            silent: flag(self.silent),
            tsconfig: self.tsconfig.clone(),
            metafile: flag(self.metafile),
            ..Options::default()
        }
    }

    fn entry(&self) -> Option<EntryInput> {
        if !self.entries.is_empty() {
            return Some(EntryInput::Map(self.entries.iter().cloned().collect()));
        }
        let files: Vec<String> = self.files.iter().map(|f| normalize_entry_path(f)).collect();
        non_empty(files).map(EntryInput::List)
    }

    fn dts(&self) -> Option<DtsInput> {
        if self.dts.is_none() && !self.dts_resolve && !self.dts_only {
            return None;
        }
        let entry = self.dts.clone().flatten();
        if !self.dts_resolve && !self.dts_only {
            return Some(match entry {
                Some(entry) => DtsInput::Entry(entry),
                None => DtsInput::Enabled(true),
            });
        }
        Some(DtsInput::Config(DtsOptions {
            entry: entry.map(EntryInput::One),
            resolve: flag(self.dts_resolve).map(DtsResolveInput::All),
            only: flag(self.dts_only),
            ..DtsOptions::default()
        }))
    }

    fn watch(&self) -> Option<WatchInput> {
        let values = self.watch.as_ref()?;
        let paths: Vec<String> = values.iter().filter(|p| !p.is_empty()).cloned().collect();
        Some(if paths.is_empty() {
            WatchInput::Enabled(true)
        } else {
            WatchInput::Paths(paths)
        })
    }
}
