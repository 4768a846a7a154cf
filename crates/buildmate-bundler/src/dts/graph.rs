//! The set of local modules reachable from the declaration entries.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use path_clean::PathClean;

use super::emit::{Emitted, emit};
use crate::bundler::ExternalSet;
use crate::bundler::external::{is_bare, package_name};
use crate::options::DtsResolve;
use crate::{Error, Result};

const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts", ".d.ts"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "crypto", "dgram",
    "dns", "events", "fs", "http", "http2", "https", "inspector", "module", "net", "os", "path",
    "perf_hooks", "process", "querystring", "readline", "repl", "stream", "string_decoder",
    "timers", "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

pub fn is_builtin(specifier: &str) -> bool {
    specifier.starts_with("node:") || NODE_BUILTINS.contains(&package_name(specifier))
}

/// How bare specifiers map back to local files.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    /// Directory `paths` and base-relative imports resolve against.
    pub base_dir: PathBuf,
    pub paths: IndexMap<String, Vec<String>>,
    pub resolve: DtsResolve,
    pub externals: ExternalSet,
}

impl Resolver {
    pub fn resolve(&self, importer: &Path, specifier: &str) -> Option<PathBuf> {
        if !is_bare(specifier) {
            let dir = importer.parent().unwrap_or_else(|| Path::new("."));
            return resolve_file(&dir.join(specifier).clean());
        }
        if is_builtin(specifier) || self.externals.is_external(specifier) {
            return None;
        }

        for (pattern, targets) in &self.paths {
            let Some(captured) = match_alias(pattern, specifier) else {
                continue;
            };
            for target in targets {
                let target = target.replacen('*', captured, 1);
                if let Some(found) = resolve_file(&self.base_dir.join(target).clean()) {
                    return Some(found);
                }
            }
        }

        if self.resolve.allows(specifier) {
            return resolve_file(&self.base_dir.join(specifier).clean());
        }
        None
    }
}

fn match_alias<'a>(pattern: &str, specifier: &'a str) -> Option<&'a str> {
    match pattern.split_once('*') {
        None => (pattern == specifier).then_some(""),
        Some((prefix, suffix)) => specifier
            .strip_prefix(prefix)?
            .strip_suffix(suffix)
            .filter(|middle| !middle.is_empty()),
    }
}

/// Find the TypeScript source behind an import path: the path itself, the
/// path with a source extension, a `.js` specifier's `.ts` twin, or an
/// `index` file inside it.
pub fn resolve_file(base: &Path) -> Option<PathBuf> {
    let is_source = |path: &Path| {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| SOURCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
    };
    if is_source(base) {
        return Some(base.to_path_buf());
    }

    let raw = base.to_string_lossy();
    for (js, ts) in [(".js", ".ts"), (".jsx", ".tsx"), (".mjs", ".mts"), (".cjs", ".cts")] {
        if let Some(stem) = raw.strip_suffix(js) {
            let candidate = PathBuf::from(format!("{stem}{ts}"));
            if is_source(&candidate) {
                return Some(candidate);
            }
        }
    }

    for ext in SOURCE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{raw}{ext}"));
        if is_source(&candidate) {
            return Some(candidate);
        }
    }
    for ext in SOURCE_EXTENSIONS {
        let candidate = base.join(format!("index{ext}"));
        if is_source(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// One local module and the local modules its specifiers resolve to.
#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub emitted: Emitted,
    /// Specifier to resolved local module.
    pub imports: IndexMap<String, PathBuf>,
}

/// Walk every module reachable from `entries` through local imports and
/// generate its declarations. Modules are returned in discovery order.
pub fn collect(entries: &[PathBuf], resolver: &Resolver) -> Result<IndexMap<PathBuf, Module>> {
    let mut modules: IndexMap<PathBuf, Module> = IndexMap::new();
    let mut queue: VecDeque<PathBuf> = entries.iter().cloned().collect();

    while let Some(path) = queue.pop_front() {
        if modules.contains_key(&path) {
            continue;
        }
        let source = std::fs::read_to_string(&path)
            .map_err(|e| Error::Dts(format!("{}: {e}", path.display())))?;
        let emitted = emit(&path, &source)?;

        let mut imports = IndexMap::new();
        for specifier in &emitted.specifiers {
            if let Some(target) = resolver.resolve(&path, specifier) {
                if !modules.contains_key(&target) {
                    queue.push_back(target.clone());
                }
                imports.insert(specifier.clone(), target);
            }
        }

        modules.insert(
            path.clone(),
            Module {
                path,
                emitted,
                imports,
            },
        );
    }
    Ok(modules)
}

/// Nearest directory containing every path.
pub fn common_dir(paths: &[PathBuf]) -> PathBuf {
    let mut dirs = paths
        .iter()
        .map(|p| p.parent().map(Path::to_path_buf).unwrap_or_default());
    let Some(mut common) = dirs.next() else {
        return PathBuf::new();
    };
    for dir in dirs {
        while !dir.starts_with(&common) {
            if !common.pop() {
                return PathBuf::new();
            }
        }
    }
    common
}

/// `path` without its source extension (`a/b.d.ts` -> `a/b`).
pub fn strip_source_extension(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    for ext in [".d.ts", ".d.mts", ".d.cts", ".tsx", ".ts", ".mts", ".cts"] {
        if let Some(stem) = raw.strip_suffix(ext) {
            return PathBuf::from(stem);
        }
    }
    path.to_path_buf()
}

/// Import specifier leading from a file in `from_dir` to the declaration
/// file `to`.
pub fn relative_specifier(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();
    let shared = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in shared..from.len() {
        parts.push("..".to_string());
    }
    for component in &target[shared..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    let mut specifier = parts.join("/");

    for (dts, js) in [(".d.mts", ".mjs"), (".d.cts", ".cjs"), (".d.ts", "")] {
        if let Some(stem) = specifier.strip_suffix(dts) {
            specifier = format!("{stem}{js}");
            break;
        }
    }
    if specifier.starts_with("..") {
        specifier
    } else {
        format!("./{specifier}")
    }
}

/// Swap quoted import specifiers in declaration text.
pub fn rewrite_specifiers(code: &str, rewrites: &[(String, String)]) -> String {
    let mut out = code.to_string();
    for (from, to) in rewrites {
        if from == to {
            continue;
        }
        out = out
            .replace(&format!("\"{from}\""), &format!("\"{to}\""))
            .replace(&format!("'{from}'"), &format!("'{to}'"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn resolves_relative_alias_and_js_twins() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let index = touch(root, "src/index.ts", "");
        let util = touch(root, "src/util.ts", "");
        let button = touch(root, "src/components/button/index.ts", "");

        let resolver = Resolver {
            base_dir: root.to_path_buf(),
            paths: IndexMap::from([("@/*".to_string(), vec!["src/*".to_string()])]),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&index, "./util"), Some(util.clone()));
        assert_eq!(resolver.resolve(&index, "./util.js"), Some(util));
        assert_eq!(resolver.resolve(&index, "@/components/button"), Some(button));
        assert_eq!(resolver.resolve(&index, "react"), None);
        assert_eq!(resolver.resolve(&index, "node:fs"), None);
    }

    #[test]
    fn base_relative_imports_need_resolve() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let index = touch(root, "src/index.ts", "");
        let shared = touch(root, "shared/types.ts", "");

        let mut resolver = Resolver {
            base_dir: root.to_path_buf(),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&index, "shared/types"), None);
        resolver.resolve = DtsResolve::All;
        assert_eq!(resolver.resolve(&index, "shared/types"), Some(shared));
    }

    #[test]
    fn collects_reachable_modules_once() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let index = touch(
            root,
            "src/index.ts",
            "export * from './a';\nexport * from './b';\nimport 'lodash';\n",
        );
        touch(root, "src/a.ts", "export * from './b';\nexport const a: number = 1;\n");
        touch(root, "src/b.ts", "export const b: string = 'b';\n");

        let modules = collect(&[index.clone()], &Resolver::default()).unwrap();
        let names: Vec<_> = modules
            .keys()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.ts", "a.ts", "b.ts"]);
        assert_eq!(modules[&index].imports.len(), 2);
    }

    #[test]
    fn relative_specifiers() {
        assert_eq!(
            relative_specifier(Path::new("/out"), Path::new("/out/util.d.ts")),
            "./util"
        );
        assert_eq!(
            relative_specifier(Path::new("/out/cli"), Path::new("/out/shared/x.d.mts")),
            "../shared/x.mjs"
        );
    }

    #[test]
    fn common_dir_of_entries() {
        let dirs = [PathBuf::from("/p/src/a/index.ts"), PathBuf::from("/p/src/b.ts")];
        assert_eq!(common_dir(&dirs), PathBuf::from("/p/src"));
    }

    #[test]
    fn rewrites_quoted_specifiers_only() {
        let code = "export * from \"@/util\";\nexport type X = '@/util';\nconst y = \"@/util-x\";";
        let out = rewrite_specifiers(code, &[("@/util".into(), "./util".into())]);
        assert!(out.contains("from \"./util\""));
        assert!(out.contains("\"@/util-x\""));
    }
}
