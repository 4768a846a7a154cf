//! Type declaration generation.
//!
//! Declarations come from oxc's isolated declarations, one module at a time.
//! Every entry gets `<name><ext>` in the output directory for each format;
//! local modules the entries reach are written next to them, keeping their
//! layout relative to the entries' common directory. Import specifiers are
//! rewritten so they point at the written files.

pub mod emit;
pub mod graph;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use buildmate_config::PackageJson;
use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::bundler::ExternalSet;
use crate::config::{DtsOutput, WorkerOptions};
use crate::logger::Logger;
use crate::options::{DtsConfig, Format};
use crate::output::{remove_matching, write_file};
use crate::report::report_size;
use crate::{Error, Result};
use graph::{Module, Resolver};

pub const LABEL: &str = "DTS";

const DECLARATION_FILES: &str = "**/*.d.{ts,mts,cts}";

static DEFAULT_REEXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^|[;}])(\s*)export\s*\{\s*([\w$]+)\s+as\s+default\s*\}").unwrap()
});

static EXPORT_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[;}])\s*export\b").unwrap());

/// `export { x as default }` becomes `export = x` when that is the entry's
/// only export.
pub fn fix_cjs_export(code: &str) -> String {
    if EXPORT_STATEMENT.find_iter(code).count() != 1 {
        return code.to_string();
    }
    DEFAULT_REEXPORT
        .replace(code, "${1}${2}export = ${3}")
        .into_owned()
}

/// Whether the `typescript` package is installed for `cwd`.
pub fn typescript_available(cwd: &Path) -> bool {
    cwd.ancestors().any(|dir| {
        dir.join("node_modules")
            .join("typescript")
            .join("package.json")
            .is_file()
    })
}

/// The outcome of one declaration build.
#[derive(Debug, Clone, Default)]
pub struct DtsBuild {
    pub written: Vec<PathBuf>,
    /// Every source file read; the worker watches these.
    pub sources: Vec<PathBuf>,
}

fn entries(options: &WorkerOptions, dts: &DtsConfig) -> IndexMap<String, PathBuf> {
    let entry = dts.entry.as_ref().unwrap_or(&options.entry);
    entry
        .named()
        .into_iter()
        .map(|(name, file)| (name, options.cwd.join(file)))
        .collect()
}

fn resolver(options: &WorkerOptions, dts: &DtsConfig) -> Result<Resolver> {
    let pkg = PackageJson::load_or_default(&options.cwd)?;
    let tsconfig_dir = options
        .tsconfig
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(&options.cwd);
    let base_dir = match dts.compiler_options.get("baseUrl").and_then(|v| v.as_str()) {
        Some(base) => tsconfig_dir.join(base),
        None => tsconfig_dir.to_path_buf(),
    };

    Ok(Resolver {
        base_dir,
        paths: options.tsconfig_resolve_paths.clone(),
        resolve: dts.resolve.clone(),
        externals: ExternalSet {
            packages: pkg.production_deps(),
            patterns: options.external.clone(),
            no_external: Vec::new(),
            skip_node_modules: false,
            aliases: Vec::new(),
        },
    })
}

/// Where each module's declaration lands for one output.
fn layout(
    modules: &IndexMap<PathBuf, Module>,
    entries: &IndexMap<String, PathBuf>,
    root: &Path,
    cwd: &Path,
    output: &DtsOutput,
) -> FxHashMap<PathBuf, PathBuf> {
    let mut paths = FxHashMap::default();
    for (name, source) in entries {
        paths.insert(source.clone(), output.out_dir.join(format!("{name}{}", output.extension)));
    }
    for path in modules.keys() {
        if paths.contains_key(path) {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .or_else(|_| path.strip_prefix(cwd))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
        let stem = graph::strip_source_extension(&rel);
        let mut file = stem.into_os_string();
        file.push(&output.extension);
        paths.insert(path.clone(), output.out_dir.join(file));
    }
    paths
}

fn render(
    module: &Module,
    target: &Path,
    layout: &FxHashMap<PathBuf, PathBuf>,
    entry: bool,
    dts: &DtsConfig,
    cjs_interop: bool,
) -> String {
    let dir = target.parent().unwrap_or(Path::new(""));
    let rewrites: Vec<(String, String)> = module
        .imports
        .iter()
        .filter_map(|(specifier, resolved)| {
            layout
                .get(resolved)
                .map(|out| (specifier.clone(), graph::relative_specifier(dir, out)))
        })
        .collect();
    let mut code = graph::rewrite_specifiers(&module.emitted.declaration, &rewrites);

    if entry {
        if cjs_interop {
            code = fix_cjs_export(&code);
        }
        if let Some(banner) = &dts.banner {
            code = format!("{banner}\n{code}");
        }
        if let Some(footer) = &dts.footer {
            code = format!("{}\n{footer}\n", code.trim_end_matches('\n'));
        }
    }
    code
}

/// Generate and write declarations for every output of `options`.
///
/// A no-op when `options.dts` is unset.
pub async fn build(options: &WorkerOptions, logger: &Logger) -> Result<DtsBuild> {
    let Some(dts) = options.dts.as_ref() else {
        return Ok(DtsBuild::default());
    };

    logger.info(LABEL, "Build start");
    let started = Instant::now();

    match generate(options, dts).await {
        Ok(build) => {
            logger.success(
                LABEL,
                format!("Build success in {}ms", started.elapsed().as_millis()),
            );
            let sizes: Vec<(String, u64)> = build
                .written
                .iter()
                .filter_map(|path| {
                    let size = std::fs::metadata(path).ok()?.len();
                    let name = path.strip_prefix(&options.cwd).unwrap_or(path);
                    Some((crate::glob::slash(&name.to_string_lossy()), size))
                })
                .collect();
            report_size(logger, LABEL, &sizes);
            Ok(build)
        }
        Err(err) => {
            logger.error(LABEL, "Build error");
            Err(err)
        }
    }
}

async fn generate(options: &WorkerOptions, dts: &DtsConfig) -> Result<DtsBuild> {
    if options.clean {
        for out_dir in unique_dirs(&options.outputs) {
            remove_matching(&out_dir, &[DECLARATION_FILES.to_string()])?;
        }
    }

    let entries = entries(options, dts);
    for (name, source) in &entries {
        if !source.is_file() {
            return Err(Error::Dts(format!(
                "entry `{name}` points at {}, which does not exist",
                source.display()
            )));
        }
    }

    let resolver = resolver(options, dts)?;
    let sources: Vec<PathBuf> = entries.values().cloned().collect();
    let modules = graph::collect(&sources, &resolver)?;
    let root = graph::common_dir(&sources);

    let mut written = Vec::new();
    for output in &options.outputs {
        let layout = layout(&modules, &entries, &root, &options.cwd, output);
        let cjs_interop = options.cjs_interop && output.format == Format::Cjs;

        for (path, module) in &modules {
            let Some(target) = layout.get(path) else {
                continue;
            };
            let is_entry = entries.values().any(|entry| entry == path);
            let code = render(module, target, &layout, is_entry, dts, cjs_interop);
            let base = &output.out_dir;
            written.push(write_file(base, target, code.as_bytes(), None).await?);
        }
    }

    Ok(DtsBuild {
        written,
        sources: modules.keys().cloned().collect(),
    })
}

fn unique_dirs(outputs: &[DtsOutput]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = outputs.iter().map(|o| o.out_dir.clone()).collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemorySink;
    use crate::options::{Entry, WatchMode};
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn worker_options(cwd: &Path, formats: &[(Format, &str)]) -> WorkerOptions {
        WorkerOptions {
            name: None,
            cwd: cwd.to_path_buf(),
            entry: Entry::List(vec!["src/index.ts".into()]),
            out_dir: cwd.join("dist"),
            outputs: formats
                .iter()
                .map(|(format, ext)| DtsOutput {
                    format: *format,
                    out_dir: cwd.join("dist"),
                    extension: ext.to_string(),
                })
                .collect(),
            dts: Some(DtsConfig::default()),
            external: Vec::new(),
            no_external: Vec::new(),
            clean: false,
            watch: WatchMode::Off,
            ignore_watch: Vec::new(),
            cjs_interop: false,
            silent: false,
            tsconfig: None,
            tsconfig_resolve_paths: IndexMap::new(),
        }
    }

    #[test]
    fn cjs_export_fix_needs_a_sole_default() {
        assert_eq!(
            fix_cjs_export("declare const x: number;\nexport { x as default };\n"),
            "declare const x: number;\nexport = x;\n"
        );
        let mixed = "declare const x: number;\nexport { x as default };\nexport declare const y: 1;\n";
        assert_eq!(fix_cjs_export(mixed), mixed);
    }

    #[tokio::test]
    async fn writes_entry_and_local_modules_per_format() {
        let dir = TempDir::new().unwrap();
        let cwd = dir.path();
        touch(cwd, "src/index.ts", "export * from './util';\nexport const a: number = 1;\n");
        touch(cwd, "src/util.ts", "export function twice(n: number): number { return n * 2; }\n");

        let options = worker_options(cwd, &[(Format::Cjs, ".d.ts"), (Format::Esm, ".d.mts")]);
        let sink = MemorySink::new();
        let build = build(&options, &Logger::memory(sink.clone())).await.unwrap();

        assert_eq!(build.written.len(), 4);
        assert_eq!(build.sources.len(), 2);
        let esm = std::fs::read_to_string(cwd.join("dist/index.d.mts")).unwrap();
        assert!(esm.contains("export * from \"./util.mjs\""));
        let util = std::fs::read_to_string(cwd.join("dist/util.d.ts")).unwrap();
        assert!(util.contains("export declare function twice(n: number): number;"));
        assert!(sink.contains("Build success"));
    }

    #[tokio::test]
    async fn named_entries_and_banner() {
        let dir = TempDir::new().unwrap();
        let cwd = dir.path();
        touch(cwd, "src/cli/main.ts", "export const run: () => void = () => {};\n");

        let mut options = worker_options(cwd, &[(Format::Esm, ".d.ts")]);
        options.dts = Some(DtsConfig {
            entry: Some(Entry::Map(IndexMap::from([(
                "cli".to_string(),
                "src/cli/main.ts".to_string(),
            )]))),
            banner: Some("/* generated */".into()),
            ..Default::default()
        });

        build(&options, &Logger::memory(MemorySink::new())).await.unwrap();
        let cli = std::fs::read_to_string(cwd.join("dist/cli.d.ts")).unwrap();
        assert!(cli.starts_with("/* generated */\n"));
    }

    #[tokio::test]
    async fn no_dts_config_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut options = worker_options(dir.path(), &[(Format::Cjs, ".d.ts")]);
        options.dts = None;
        let sink = MemorySink::new();
        let build = build(&options, &Logger::memory(sink.clone())).await.unwrap();
        assert!(build.written.is_empty());
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn generation_errors_are_logged() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/index.ts", "export const f = (x) => x;\n");
        let options = worker_options(dir.path(), &[(Format::Cjs, ".d.ts")]);
        let sink = MemorySink::new();
        let err = build(&options, &Logger::memory(sink.clone())).await.unwrap_err();
        assert!(matches!(err, Error::Dts(_)));
        assert!(sink.contains("Build error"));
    }
}
