//! Source transforms applied before the bundler reads a file.
//!
//! The esbuild executable has no load hook, so rewritten files are served
//! from a [`SourceOverlay`]: a hidden copy of the project tree inside `cwd`
//! in which Svelte components and decorated sources hold their transformed
//! text. The bundler is pointed at the overlay and every path it reports is
//! mapped back with [`SourceOverlay::restore`].

pub mod decorators;
pub mod svelte;

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use rustc_hash::FxHashSet;
use walkdir::WalkDir;

use super::diagnostics::Message;
use super::{BundleOutcome, BundleRequest, BundlerExtension};
use crate::options::Entry;
use crate::{Result, glob};

/// Directory name prefix of overlays and esbuild staging directories.
pub const OVERLAY_PREFIX: &str = ".build-mate-src-";
/// Decorator helpers live here, relative to the overlay root.
const RUNTIME_DIR: &str = "__build_mate_runtime";

const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

/// Which transforms a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preload {
    pub decorator_metadata: bool,
    pub svelte: bool,
    pub sourcemap: bool,
}

impl Preload {
    pub fn for_request(request: &BundleRequest) -> Self {
        Self {
            decorator_metadata: request.has_extension(&BundlerExtension::DecoratorMetadata),
            svelte: request.has_extension(&BundlerExtension::Svelte),
            sourcemap: request.sourcemap,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.decorator_metadata && !self.svelte
    }

    fn is_component(&self, path: &Path) -> bool {
        self.svelte && path.extension().is_some_and(|ext| ext == "svelte")
    }
}

/// A transformed copy of the project, removed on drop.
#[derive(Debug)]
pub struct SourceOverlay {
    cwd: PathBuf,
    dir: tempfile::TempDir,
    /// Directory name, also the key prefix the bundler reports.
    name: String,
    /// Overlay-relative keys with no counterpart in the project.
    generated: FxHashSet<String>,
}

impl SourceOverlay {
    /// Build the overlay for `request`, or `None` when no file under `cwd`
    /// needs rewriting.
    pub async fn for_request(request: &BundleRequest, preload: Preload) -> Result<Option<Self>> {
        if preload.is_empty() {
            return Ok(None);
        }
        let cwd = request.cwd.clone();
        let out_dir = if request.out_dir.is_absolute() {
            request.out_dir.clone()
        } else {
            cwd.join(&request.out_dir)
        }
        .clean();
        tokio::task::spawn_blocking(move || Self::prepare(&cwd, &out_dir, preload))
            .await
            .map_err(std::io::Error::other)?
    }

    /// Synchronous body of [`SourceOverlay::for_request`].
    pub fn prepare(cwd: &Path, out_dir: &Path, preload: Preload) -> Result<Option<Self>> {
        let files = project_files(cwd, out_dir);
        let has_component = files.iter().any(|path| preload.is_component(path));
        if !has_component && !preload.decorator_metadata {
            return Ok(None);
        }

        let dir = tempfile::Builder::new().prefix(OVERLAY_PREFIX).tempdir_in(cwd)?;
        let name = dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let runtime = glob::slash(&dir.path().join(RUNTIME_DIR).to_string_lossy());

        let mut overlay = Self {
            cwd: cwd.to_path_buf(),
            dir,
            name,
            generated: FxHashSet::default(),
        };
        let mut rewritten = 0usize;
        let mut uses_helpers = false;

        for path in &files {
            let Ok(rel) = path.strip_prefix(cwd) else {
                continue;
            };
            let target = overlay.dir.path().join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            if preload.is_component(path) {
                let source = std::fs::read_to_string(path)?;
                let component = svelte::compile_component(path, &source)?;
                if let Some(css) = &component.css {
                    let sheet = svelte::stylesheet_name(
                        &target.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                    );
                    std::fs::write(target.with_file_name(&sheet), css)?;
                    overlay.generated.insert(glob::slash(
                        &rel.with_file_name(&sheet).to_string_lossy(),
                    ));
                }
                std::fs::write(&target, component.code)?;
                rewritten += 1;
                continue;
            }

            if preload.decorator_metadata && decorators::is_candidate(path) {
                let source = std::fs::read_to_string(path)?;
                if let Some(code) = decorators::emit_decorator_metadata(
                    path,
                    &source,
                    &runtime,
                    preload.sourcemap,
                ) {
                    uses_helpers |= code.contains(&runtime);
                    std::fs::write(&target, code)?;
                    rewritten += 1;
                    continue;
                }
            }

            std::fs::copy(path, &target)?;
        }

        if rewritten == 0 {
            return Ok(None);
        }
        if uses_helpers {
            let helpers = overlay.dir.path().join(RUNTIME_DIR).join("helpers");
            std::fs::create_dir_all(&helpers)?;
            for (helper, source) in decorators::HELPERS {
                std::fs::write(helpers.join(format!("{helper}.js")), source)?;
            }
        }

        tracing::debug!(
            overlay = %overlay.dir.path().display(),
            files = files.len(),
            rewritten,
            "prepared source overlay"
        );
        Ok(Some(overlay))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The same entries, read from the overlay where it has a copy.
    pub fn entry(&self, entry: &Entry) -> Entry {
        let map = |file: &String| {
            let rel = file.strip_prefix("./").unwrap_or(file);
            if self.dir.path().join(rel).is_file() {
                format!("{}/{rel}", self.name)
            } else {
                file.clone()
            }
        };
        match entry {
            Entry::List(files) => Entry::List(files.iter().map(map).collect()),
            Entry::Map(entries) => Entry::Map(
                entries
                    .iter()
                    .map(|(name, file)| (name.clone(), map(file)))
                    .collect(),
            ),
        }
    }

    /// A project path moved into the overlay, if copied there.
    pub fn path(&self, path: &Path) -> PathBuf {
        let absolute = self.cwd.join(path).clean();
        match absolute.strip_prefix(self.cwd.clean()) {
            Ok(rel) if self.dir.path().join(rel).is_file() => self.dir.path().join(rel),
            _ => path.to_path_buf(),
        }
    }

    /// `request` with entries, injected files and tsconfig read from the
    /// overlay.
    pub fn request(&self, request: &BundleRequest) -> BundleRequest {
        let mut staged = request.clone();
        staged.entry = self.entry(&request.entry);
        staged.inject = request.inject.iter().map(|file| self.path(file)).collect();
        staged.tsconfig = request.tsconfig.as_deref().map(|file| self.path(file));
        staged
    }

    /// Project key for a key the bundler reported relative to `cwd`.
    /// `None` for files that exist only in the overlay.
    pub fn restore_key(&self, key: &str) -> Option<String> {
        let Some(rel) = key
            .strip_prefix(&self.name)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Some(key.to_string());
        };
        if rel.starts_with(RUNTIME_DIR) || self.generated.contains(rel) {
            return None;
        }
        Some(rel.to_string())
    }

    /// Map overlay paths in an outcome back to the project: metafile keys,
    /// diagnostic locations and source-map `sources`.
    pub fn restore(&self, outcome: &mut BundleOutcome) {
        let metafile = &mut outcome.metafile;
        metafile.inputs = std::mem::take(&mut metafile.inputs)
            .into_iter()
            .filter_map(|(key, mut input)| {
                let key = self.restore_key(&key)?;
                input
                    .imports
                    .retain_mut(|import| self.restore_import(&mut import.path, import.external));
                Some((key, input))
            })
            .collect();
        for output in metafile.outputs.values_mut() {
            output.entry_point = output
                .entry_point
                .take()
                .map(|entry| self.restore_key(&entry).unwrap_or(entry));
        }

        self.restore_messages(&mut outcome.warnings);

        let prefix = format!("{}/", self.name);
        for file in &mut outcome.files {
            if file.path.extension().is_none_or(|ext| ext != "map") {
                continue;
            }
            let Ok(json) = std::str::from_utf8(&file.contents) else {
                continue;
            };
            if json.contains(&prefix) {
                file.contents = json.replace(&prefix, "").into_bytes();
            }
        }
    }

    pub fn restore_messages(&self, messages: &mut [Message]) {
        for message in messages {
            if let Some(location) = message.location.as_mut() {
                if let Some(file) = self.restore_key(&location.file) {
                    location.file = file;
                }
            }
        }
    }

    fn restore_import(&self, path: &mut String, external: bool) -> bool {
        if external {
            return true;
        }
        match self.restore_key(path) {
            Some(key) => {
                *path = key;
                true
            }
            None => false,
        }
    }
}

/// Files the overlay mirrors: everything under `cwd` except dependency and
/// VCS directories, the output directory and other overlays.
fn project_files(cwd: &Path, out_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(cwd)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !(SKIP_DIRS.contains(&name.as_ref())
                || name.starts_with(".build-mate-")
                || entry.path() == out_dir)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
        })
        .map(|entry| entry.into_path())
        .collect()
}
