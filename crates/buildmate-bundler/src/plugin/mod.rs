//! Transform plugins.
//!
//! A [`Plugin`] is a name plus any subset of four hooks, all of which default
//! to no-ops. The [`PluginPipeline`] invokes them in registration order for
//! every build pass of one format:
//!
//! 1. `modify_bundle_options` before the bundler runs,
//! 2. `build_start` once,
//! 3. `render_chunk` for every JS/CSS chunk, threading code and source map
//!    from plugin to plugin,
//! 4. `build_end` after each written file, with the files written so far.

mod pipeline;
pub mod sourcemap;

pub use pipeline::{PassState, PluginPipeline};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use oxc_sourcemap::SourceMap;

use crate::Result;
use crate::bundler::{BundleRequest, Bundler, MetaImport};
use crate::logger::Logger;
use crate::options::{Format, NormalizedOptions};

/// Per-pass state shared by every hook of one format's build.
#[derive(Clone)]
pub struct PluginContext {
    pub format: Format,
    pub splitting: bool,
    pub options: Arc<NormalizedOptions>,
    pub logger: Logger,
    /// The bundling capability, for plugins that re-run parts of it.
    pub bundler: Arc<dyn Bundler>,
}

impl PluginContext {
    pub fn out_dir(&self) -> PathBuf {
        self.options.format_out_dir(self.format)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("format", &self.format)
            .field("splitting", &self.splitting)
            .field("bundler", &self.bundler.name())
            .finish_non_exhaustive()
    }
}

/// A generated code file on its way through the render hooks.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Absolute output path.
    pub path: PathBuf,
    pub code: String,
    pub map: Option<SourceMap>,
    /// Unix file mode to apply when written.
    pub mode: Option<u32>,
    /// Source entry this chunk was generated for, if any.
    pub entry_point: Option<String>,
    pub exports: Vec<String>,
    pub imports: Vec<MetaImport>,
}

impl Chunk {
    pub fn new(path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            map: None,
            mode: None,
            entry_point: None,
            exports: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.entry_point.is_some()
    }

    pub fn is_js(&self) -> bool {
        is_js(&self.path)
    }

    pub fn is_css(&self) -> bool {
        is_css(&self.path)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A non-code output file. Written as is.
#[derive(Debug, Clone)]
pub struct Asset {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// What a render hook hands back: replacement code and, optionally, a map
/// from the replacement to the code it was given.
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub code: String,
    pub map: Option<SourceMap>,
}

impl RenderedChunk {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// A file that has been persisted. Name and size are derived from the stored
/// contents when asked for.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    path: PathBuf,
    cwd: PathBuf,
    contents: Arc<[u8]>,
}

impl WrittenFile {
    pub fn new(path: PathBuf, cwd: &Path, contents: Arc<[u8]>) -> Self {
        Self {
            path,
            cwd: cwd.to_path_buf(),
            contents,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the working directory, with forward slashes.
    pub fn name(&self) -> String {
        let relative = self.path.strip_prefix(&self.cwd).unwrap_or(&self.path);
        crate::glob::slash(&relative.to_string_lossy())
    }

    pub fn size(&self) -> usize {
        self.contents.len()
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Adjust the request before the bundler sees it.
    fn modify_bundle_options(
        &self,
        _ctx: &PluginContext,
        _request: &mut BundleRequest,
    ) -> Result<()> {
        Ok(())
    }

    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Transform one chunk. Returning `None` leaves the code untouched.
    /// Fields other than `code` and `map` (such as `mode`) may be edited in
    /// place.
    async fn render_chunk(
        &self,
        _ctx: &PluginContext,
        _chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        Ok(None)
    }

    /// Called after each written file with every file written so far in
    /// this pass.
    async fn build_end(&self, _ctx: &PluginContext, _files: &[WrittenFile]) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn is_js(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "js" | "cjs" | "mjs"))
}

pub(crate) fn is_css(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "css")
}

pub(crate) fn is_map(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "map")
}
