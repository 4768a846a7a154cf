use std::path::Path;

use buildmate_config::{
    CleanInput, DtsInput, DtsOptions, DtsResolveInput, EntryInput, MinifyInput, Options,
    SourcemapInput, TreeshakeInput, TsConfig, WatchInput,
};

use super::{
    Banner, DtsConfig, DtsResolve, Entry, Format, KillSignal, Minify, NormalizedOptions, Platform,
    SourceMapMode, WatchMode,
};
use crate::logger::Logger;
use crate::{Error, Result, glob};

pub(crate) const DEFAULT_OUT_DIR: &str = "dist";
pub(crate) const DEFAULT_TARGET: &str = "node16";

/// Merge config-file options with overrides and resolve them into a
/// [`NormalizedOptions`].
///
/// Fails when no entry can be resolved, when a named entry points at a
/// missing file, or when no tsconfig can be found.
///
/// Also sets the shared silent flag on `logger`'s settings.
pub fn normalize(
    from_config: Options,
    overrides: Options,
    cwd: &Path,
    logger: &Logger,
) -> Result<NormalizedOptions> {
    let raw = from_config.merge(overrides);

    let silent = raw.silent.unwrap_or(false);
    logger.settings().set_silent(silent);

    let entry = resolve_entry(raw.entry.clone(), cwd, logger)?;
    let mut opts = NormalizedOptions::new(cwd, entry);
    opts.silent = silent;
    opts.name = raw.name;

    if let Some(out_dir) = raw.out_dir {
        opts.out_dir = out_dir;
    }
    if let Some(format) = raw.format {
        let formats = format
            .into_vec()
            .iter()
            .flat_map(|f| f.split(','))
            .map(str::parse::<Format>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Config)?;
        if !formats.is_empty() {
            opts.format = dedup(formats);
        }
    }

    opts.dts = raw.dts.and_then(normalize_dts);
    opts.external = raw.external.unwrap_or_default();
    opts.no_external = raw.no_external.unwrap_or_default();
    opts.skip_node_modules_bundle = raw.skip_node_modules_bundle.unwrap_or(false);
    opts.clean = match raw.clean {
        Some(CleanInput::Enabled(true)) => Some(Vec::new()),
        Some(CleanInput::Patterns(patterns)) => Some(patterns),
        Some(CleanInput::Enabled(false)) | None => None,
    };
    opts.watch = match raw.watch {
        Some(WatchInput::Enabled(true)) => WatchMode::All,
        Some(WatchInput::Path(path)) if path.is_empty() => WatchMode::All,
        Some(WatchInput::Path(path)) => WatchMode::Paths(vec![path]),
        Some(WatchInput::Paths(paths)) if paths.is_empty() => WatchMode::All,
        Some(WatchInput::Paths(paths)) => WatchMode::Paths(paths),
        Some(WatchInput::Enabled(false)) | None => WatchMode::Off,
    };
    opts.ignore_watch = raw.ignore_watch.map(|i| i.into_vec()).unwrap_or_default();
    opts.minify = match raw.minify {
        Some(MinifyInput::Enabled(true)) => Minify::Bundler,
        Some(MinifyInput::Named(name)) if name == "terser" => Minify::Terser,
        Some(MinifyInput::Named(name)) => {
            return Err(Error::Config(format!(
                "unknown minifier `{name}` (expected true or \"terser\")"
            )));
        }
        Some(MinifyInput::Enabled(false)) | None => Minify::Off,
    };
    opts.minify_whitespace = raw.minify_whitespace.unwrap_or(false);
    opts.minify_identifiers = raw.minify_identifiers.unwrap_or(false);
    opts.minify_syntax = raw.minify_syntax.unwrap_or(false);
    opts.keep_names = raw.keep_names.unwrap_or(false);
    opts.splitting = raw.splitting;
    if let Some(platform) = raw.platform {
        opts.platform = platform.parse::<Platform>().map_err(Error::Config)?;
    }
    opts.loader = raw.loader.unwrap_or_default();
    opts.shims = raw.shims.unwrap_or(false);
    opts.sourcemap = match raw.sourcemap {
        Some(SourcemapInput::Enabled(true)) => SourceMapMode::External,
        Some(SourcemapInput::Mode(mode)) if mode == "inline" => SourceMapMode::Inline,
        Some(SourcemapInput::Mode(mode)) => {
            return Err(Error::Config(format!(
                "unknown sourcemap mode `{mode}` (expected true or \"inline\")"
            )));
        }
        Some(SourcemapInput::Enabled(false)) | None => SourceMapMode::Off,
    };
    opts.env = raw.env.unwrap_or_default();
    opts.define = raw.define.unwrap_or_default();
    opts.inject = raw.inject.unwrap_or_default();
    opts.replace_node_env = raw.replace_node_env.unwrap_or(false);
    opts.legacy_output = raw.legacy_output.unwrap_or(false);
    opts.global_name = raw.global_name;
    opts.inject_style = raw.inject_style.unwrap_or(false);
    opts.treeshake = match raw.treeshake {
        Some(TreeshakeInput::Enabled(enabled)) => enabled,
        Some(TreeshakeInput::Preset(_)) => true,
        None => false,
    };
    opts.on_success = raw.on_success.filter(|cmd| !cmd.trim().is_empty());
    if let Some(signal) = raw.kill_signal {
        opts.kill_signal = signal.parse::<KillSignal>().map_err(Error::Config)?;
    }
    opts.cjs_interop = raw.cjs_interop.unwrap_or(false);
    opts.banner = raw
        .banner
        .map(|b| Banner { js: b.js, css: b.css })
        .unwrap_or_default();
    opts.footer = raw
        .footer
        .map(|b| Banner { js: b.js, css: b.css })
        .unwrap_or_default();
    opts.metafile = raw.metafile.unwrap_or(false);
    opts.jsx_factory = raw.jsx_factory;
    opts.jsx_fragment = raw.jsx_fragment;
    opts.bundle = raw.bundle.unwrap_or(true);
    opts.pure = raw.pure.unwrap_or_default();

    let tsconfig = TsConfig::load(cwd, raw.tsconfig.as_deref())?;
    logger.info(
        "CLI",
        format!(
            "Using tsconfig: {}",
            glob::slash(
                &tsconfig
                    .path
                    .strip_prefix(cwd)
                    .unwrap_or(&tsconfig.path)
                    .to_string_lossy()
            )
        ),
    );
    opts.tsconfig_resolve_paths = tsconfig.compiler_options.paths.clone();
    opts.tsconfig_decorator_metadata = tsconfig
        .compiler_options
        .emit_decorator_metadata
        .unwrap_or(false);
    if let Some(dts) = opts.dts.as_mut() {
        let mut merged = tsconfig.raw_compiler_options.clone();
        for (key, value) in std::mem::take(&mut dts.compiler_options) {
            merged.insert(key, value);
        }
        dts.compiler_options = merged;
    }
    opts.tsconfig = Some(tsconfig.path.clone());

    opts.target = match raw.target {
        Some(target) => target
            .into_vec()
            .iter()
            .flat_map(|t| t.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        None => tsconfig
            .compiler_options
            .target
            .as_deref()
            .map(|t| vec![t.to_lowercase()])
            .unwrap_or_default(),
    };
    if opts.target.is_empty() {
        opts.target = vec![DEFAULT_TARGET.to_string()];
    }

    Ok(opts)
}

fn resolve_entry(entry: Option<EntryInput>, cwd: &Path, logger: &Logger) -> Result<Entry> {
    let no_input = || Error::Config("No input files, try \"build-mate <your-file>\" instead".into());

    match entry {
        None => Err(no_input()),
        Some(EntryInput::One(file)) => resolve_list(vec![file], cwd, logger),
        Some(EntryInput::List(files)) if files.is_empty() => Err(no_input()),
        Some(EntryInput::List(files)) => resolve_list(files, cwd, logger),
        Some(EntryInput::Map(map)) if map.is_empty() => Err(no_input()),
        Some(EntryInput::Map(map)) => {
            for (alias, file) in &map {
                if !cwd.join(file).exists() {
                    return Err(Error::Config(format!("Cannot find {alias}: {file}")));
                }
            }
            let listed: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            logger.info("CLI", format!("Building entry: {}", listed.join(", ")));
            Ok(Entry::Map(map))
        }
    }
}

fn resolve_list(patterns: Vec<String>, cwd: &Path, logger: &Logger) -> Result<Entry> {
    let files = glob::expand(cwd, &patterns)?;
    if files.is_empty() {
        return Err(Error::Config(format!("Cannot find {}", patterns.join(","))));
    }
    logger.info("CLI", format!("Building entry: {}", files.join(", ")));
    Ok(Entry::List(files))
}

fn normalize_dts(input: DtsInput) -> Option<DtsConfig> {
    match input {
        DtsInput::Enabled(false) => None,
        DtsInput::Enabled(true) => Some(DtsConfig::default()),
        DtsInput::Entry(entry) => Some(DtsConfig {
            entry: Some(Entry::List(vec![entry])),
            ..DtsConfig::default()
        }),
        DtsInput::Config(DtsOptions {
            entry,
            resolve,
            only,
            banner,
            footer,
            compiler_options,
        }) => Some(DtsConfig {
            entry: entry.map(|e| match e {
                EntryInput::One(file) => Entry::List(vec![file]),
                EntryInput::List(files) => Entry::List(files),
                EntryInput::Map(map) => Entry::Map(map),
            }),
            resolve: match resolve {
                Some(DtsResolveInput::All(true)) => DtsResolve::All,
                Some(DtsResolveInput::Only(names)) => DtsResolve::Only(names),
                Some(DtsResolveInput::All(false)) | None => DtsResolve::None,
            },
            only: only.unwrap_or(false),
            banner,
            footer,
            compiler_options: compiler_options.unwrap_or_default(),
        }),
    }
}

fn dedup(formats: Vec<Format>) -> Vec<Format> {
    let mut out = Vec::with_capacity(formats.len());
    for format in formats {
        if !out.contains(&format) {
            out.push(format);
        }
    }
    out
}
