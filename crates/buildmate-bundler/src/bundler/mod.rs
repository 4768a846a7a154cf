//! The bundling capability.
//!
//! A [`Bundler`] compiles entry points into output files plus esbuild-style
//! [`Metafile`] metadata for one format, and transforms single chunks of code
//! for the render-chunk plugins. [`EsbuildBundler`] drives the esbuild
//! executable; with the `rolldown` feature, `RolldownBundler` bundles
//! in-process.

pub mod diagnostics;
mod esbuild;
pub mod external;
pub mod preload;
#[cfg(feature = "rolldown")]
mod rolldown;
#[cfg(test)]
pub(crate) mod testing;

pub use esbuild::EsbuildBundler;
pub use external::ExternalSet;
pub use preload::{Preload, SourceOverlay};
#[cfg(feature = "rolldown")]
pub use rolldown::RolldownBundler;

use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexMap;
use oxc_sourcemap::SourceMap;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::options::{Banner, Entry, Format, NormalizedOptions, Platform};
use diagnostics::Message;

/// Optional capabilities a backend translates into its own terms.
#[derive(Debug, Clone, PartialEq)]
pub enum BundlerExtension {
    /// Keep `node:` imports external and strip the prefix from cjs output.
    NodeProtocol,
    /// Leave matching imports unbundled.
    Externals(ExternalSet),
    /// Emit decorator metadata (`emitDecoratorMetadata`).
    DecoratorMetadata,
    /// Copy native `.node` addons as files.
    NativeNodeModules,
    /// Compile stylesheets imported from code.
    Stylesheets,
    /// Load `.svelte` components as their script blocks, with style blocks
    /// compiled into an imported stylesheet.
    Svelte,
}

/// Everything a backend needs for one format's bundle.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub cwd: PathBuf,
    pub entry: Entry,
    /// Format handed to the bundler; may differ from the pass format.
    pub format: Format,
    pub platform: Platform,
    pub target: Vec<String>,
    pub out_dir: PathBuf,
    /// Extension for JS output, `None` to keep the bundler's default.
    pub js_extension: Option<String>,
    pub bundle: bool,
    pub splitting: bool,
    pub sourcemap: bool,
    pub minify_whitespace: bool,
    pub minify_identifiers: bool,
    pub minify_syntax: bool,
    pub keep_names: bool,
    pub define: IndexMap<String, String>,
    pub inject: Vec<PathBuf>,
    pub loader: IndexMap<String, String>,
    pub main_fields: Vec<String>,
    pub global_name: Option<String>,
    pub jsx_factory: Option<String>,
    pub jsx_fragment: Option<String>,
    pub pure: Vec<String>,
    pub banner: Banner,
    pub footer: Banner,
    pub tsconfig: Option<PathBuf>,
    pub extensions: Vec<BundlerExtension>,
}

impl BundleRequest {
    /// A request carrying the options that pass straight through to the
    /// bundler. Derived settings (format upgrade, defines, loaders,
    /// extensions) are left for the engine to fill in.
    pub fn from_options(options: &NormalizedOptions, format: Format) -> Self {
        Self {
            cwd: options.cwd.clone(),
            entry: options.entry.clone(),
            format,
            platform: options.platform,
            target: options.target.clone(),
            out_dir: options.format_out_dir(format),
            js_extension: None,
            bundle: options.bundle,
            splitting: false,
            sourcemap: options.sourcemap.enabled(),
            minify_whitespace: options.minify_whitespace,
            minify_identifiers: options.minify_identifiers,
            minify_syntax: options.minify_syntax,
            keep_names: options.keep_names,
            define: IndexMap::new(),
            inject: options.inject.iter().map(|file| options.resolve_path(file)).collect(),
            loader: IndexMap::new(),
            main_fields: Vec::new(),
            global_name: options.global_name.clone(),
            jsx_factory: options.jsx_factory.clone(),
            jsx_fragment: options.jsx_fragment.clone(),
            pure: options.pure.clone(),
            banner: options.banner.clone(),
            footer: options.footer.clone(),
            tsconfig: options.tsconfig.clone(),
            extensions: Vec::new(),
        }
    }

    pub fn has_extension(&self, wanted: &BundlerExtension) -> bool {
        self.extensions
            .iter()
            .any(|ext| std::mem::discriminant(ext) == std::mem::discriminant(wanted))
    }

    pub fn externals(&self) -> Option<&ExternalSet> {
        self.extensions.iter().find_map(|ext| match ext {
            BundlerExtension::Externals(set) => Some(set),
            _ => None,
        })
    }

    pub fn minify_any(&self) -> bool {
        self.minify_whitespace || self.minify_identifiers || self.minify_syntax
    }
}

/// One file produced by the bundler, already placed at its final path.
#[derive(Debug, Clone)]
pub struct BundledFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metafile {
    #[serde(default)]
    pub inputs: IndexMap<String, MetaInput>,
    #[serde(default)]
    pub outputs: IndexMap<String, MetaOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInput {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub imports: Vec<MetaImport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaImport {
    pub path: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaOutput {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub imports: Vec<MetaImport>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_bundle: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BundleOutcome {
    pub files: Vec<BundledFile>,
    /// Keys are paths relative to the request's `cwd`, with forward slashes.
    pub metafile: Metafile,
    pub warnings: Vec<Message>,
}

/// Options for transforming a single chunk.
#[derive(Debug, Clone, Default)]
pub struct TransformRequest {
    /// Name used in diagnostics and as the map's source.
    pub sourcefile: String,
    /// Convert module syntax to this format.
    pub format: Option<Format>,
    /// Lower syntax to this target.
    pub target: Option<String>,
    pub minify: bool,
    pub keep_names: bool,
    pub tree_shaking: bool,
    pub sourcemap: bool,
    pub global_name: Option<String>,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<SourceMap>,
}

#[async_trait]
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;

    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutcome>;

    async fn transform(&self, code: &str, request: &TransformRequest) -> Result<TransformOutput>;
}
