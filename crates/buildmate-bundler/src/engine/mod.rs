//! Per-format build passes.
//!
//! [`BuildEngine::run_one_format`] turns a [`BuildConfiguration`] into a
//! [`BundleRequest`] for one output format, runs the bundler and hands the
//! result to the [`PluginPipeline`]. [`BuildEngine::build_formats`] runs every
//! requested format of a target concurrently.

mod deps;
mod shims;
pub mod styles;

pub use deps::DependencyTracker;
pub use shims::ShimFiles;
pub use styles::{StyleSheetMap, compile_css};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use buildmate_config::PackageJson;
use futures::future::join_all;
use indexmap::IndexMap;

use crate::bundler::diagnostics::filter_warnings;
use crate::bundler::{BundleRequest, Bundler, BundlerExtension, ExternalSet};
use crate::config::BuildConfiguration;
use crate::logger::Logger;
use crate::options::{Format, Minify, NormalizedOptions, Platform};
use crate::output::{remove_matching, write_file};
use crate::plugin::{PluginContext, PluginPipeline};
use crate::plugins::builtin_plugins;
use crate::{Error, Result};
use styles::StylePass;

/// Extensions copied to the output directory as files unless the user maps
/// them to another loader.
const FILE_LOADER_EXTENSIONS: &[&str] = &[
    ".aac", ".eot", ".flac", ".gif", ".jpeg", ".jpg", ".mp3", ".mp4", ".ogg", ".otf", ".png",
    ".svg", ".ttf", ".wav", ".webm", ".webp", ".woff", ".woff2",
];

/// Declarations belong to the declaration task and survive a clean.
const DECLARATION_GLOB: &str = "!**/*.d.{ts,cts,mts}";

pub struct BuildEngine {
    bundler: Arc<dyn Bundler>,
    logger: Logger,
    shims: ShimFiles,
}

impl BuildEngine {
    pub fn new(bundler: Arc<dyn Bundler>, logger: Logger) -> Self {
        Self {
            bundler,
            logger,
            shims: ShimFiles::default(),
        }
    }

    pub fn bundler(&self) -> &Arc<dyn Bundler> {
        &self.bundler
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Built-in transforms followed by the configuration's own plugins.
    pub fn pipeline(config: &BuildConfiguration) -> PluginPipeline {
        let mut plugins = builtin_plugins();
        plugins.extend(config.plugins.iter().cloned());
        PluginPipeline::new(plugins)
    }

    /// Build every requested format concurrently.
    ///
    /// Each format gets its own pipeline. The first format, or every format
    /// when styles are injected, compiles stylesheets into the shared map.
    /// All passes run to completion; the first error is returned and the
    /// dependency set is left at the pre-pass snapshot.
    pub async fn build_formats(
        &self,
        config: &BuildConfiguration,
        deps: &DependencyTracker,
    ) -> Result<()> {
        let styles = StyleSheetMap::new();
        let inject_style = config.options.inject_style;

        let passes = config.options.format.iter().enumerate().map(|(index, &format)| {
            let styles = &styles;
            async move {
                let mut pipeline = Self::pipeline(config);
                let style_writer = index == 0 || inject_style;
                self.run_one_format(config, format, &mut pipeline, styles, style_writer, deps)
                    .await
            }
        });

        let results = join_all(passes).await;
        // A sibling that finished after a failed pass has recorded on top of
        // the restored snapshot.
        if results.iter().any(Result::is_err) {
            deps.rollback();
        }
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    /// One format's build pass. On failure the dependency set is restored
    /// to the snapshot taken when the pass began.
    pub async fn run_one_format(
        &self,
        config: &BuildConfiguration,
        format: Format,
        pipeline: &mut PluginPipeline,
        styles: &StyleSheetMap,
        style_writer: bool,
        deps: &DependencyTracker,
    ) -> Result<()> {
        let result = self
            .run_pass(config, format, pipeline, styles, style_writer, deps)
            .await;
        if result.is_err() {
            deps.rollback();
        }
        result
    }

    async fn run_pass(
        &self,
        config: &BuildConfiguration,
        format: Format,
        pipeline: &mut PluginPipeline,
        styles: &StyleSheetMap,
        style_writer: bool,
        deps: &DependencyTracker,
    ) -> Result<()> {
        let options = &config.options;
        let label = format.as_str();

        let pkg = PackageJson::load_or_default(&options.cwd)?;
        let externals = ExternalSet::for_project(options, &pkg)?;

        self.logger.info(label, "Build start");
        let started = Instant::now();

        let splitting = match format {
            Format::Iife => false,
            _ => options.splitting.unwrap_or(format == Format::Esm),
        };

        pipeline.set_context(PluginContext {
            format,
            splitting,
            options: Arc::clone(options),
            logger: self.logger.clone(),
            bundler: Arc::clone(&self.bundler),
        });
        pipeline.build_started().await?;

        let mut request = self.request(config, format, splitting, pkg.package_type.as_deref(), externals)?;
        pipeline.modify_bundle_options(&mut request)?;

        let outcome = match self.bundler.bundle(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.logger.error(label, "Build failed");
                return Err(err);
            }
        };

        if !self.logger.is_silent() {
            for warning in filter_warnings(outcome.warnings) {
                self.logger.warn(label, warning);
            }
        }

        let mut files = outcome.files;
        let metafile = outcome.metafile;
        StylePass {
            options,
            out_dir: &options.format_out_dir(format),
            styles,
            writer: style_writer,
        }
        .apply(&mut files, &metafile)?;

        pipeline.build_finished(files, &metafile).await?;
        self.logger.success(
            label,
            format!("Build success in {}ms", started.elapsed().as_millis()),
        );

        deps.record(&options.cwd, metafile.inputs.keys());

        if options.metafile {
            let out_dir = options.out_dir_path();
            let json = serde_json::to_vec(&metafile)
                .map_err(|e| Error::WriteFailure(format!("metafile: {e}")))?;
            write_file(&out_dir, &metafile_path(options, format), &json, None).await?;
        }
        Ok(())
    }

    /// Assemble the bundler request for one pass.
    ///
    /// Splitting under cjs and tree shaking both bundle as esm; the
    /// render-chunk plugins convert back to the pass format.
    fn request(
        &self,
        config: &BuildConfiguration,
        format: Format,
        splitting: bool,
        package_type: Option<&str>,
        externals: ExternalSet,
    ) -> Result<BundleRequest> {
        let options = &config.options;
        let mut request = BundleRequest::from_options(options, format);

        if (format == Format::Cjs && splitting) || options.treeshake {
            request.format = Format::Esm;
        }
        request.splitting = splitting;
        if !options.legacy_output {
            request.js_extension = Some(config.out_extension(format, package_type).js.to_string());
        }

        request.define = defines(options, format);

        let mut inject = Vec::new();
        if options.shims {
            if format == Format::Cjs {
                inject.push(self.shims.cjs()?);
            }
            if format == Format::Esm && options.platform == Platform::Node {
                inject.push(self.shims.esm()?);
            }
        }
        inject.append(&mut request.inject);
        request.inject = inject;

        let mut loader: IndexMap<String, String> = FILE_LOADER_EXTENSIONS
            .iter()
            .map(|ext| (ext.to_string(), "file".to_string()))
            .collect();
        loader.insert(".css".to_string(), "css".to_string());
        loader.extend(options.loader.clone());
        request.loader = loader;

        request.main_fields = match options.platform {
            Platform::Node => vec!["module".into(), "main".into()],
            _ => vec!["browser".into(), "module".into(), "main".into()],
        };

        if format == Format::Cjs {
            request.extensions.push(BundlerExtension::NodeProtocol);
        }
        if format != Format::Iife {
            request.extensions.push(BundlerExtension::Externals(externals));
        }
        if options.tsconfig_decorator_metadata {
            request.extensions.push(BundlerExtension::DecoratorMetadata);
            request.keep_names = true;
        }
        request.extensions.push(BundlerExtension::NativeNodeModules);
        request.extensions.push(BundlerExtension::Stylesheets);
        request.extensions.push(BundlerExtension::Svelte);

        if options.minify == Minify::Bundler {
            request.minify_whitespace = true;
            request.minify_identifiers = true;
            request.minify_syntax = true;
        }

        Ok(request)
    }
}

impl std::fmt::Debug for BuildEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildEngine")
            .field("bundler", &self.bundler.name())
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// Global replacements: the format marker, the cjs `import.meta.url` shim,
/// user defines, then every env variable under both `process.env` and
/// `import.meta.env`.
fn defines(options: &NormalizedOptions, format: Format) -> IndexMap<String, String> {
    let mut define = IndexMap::new();
    define.insert("BUILD_MATE_FORMAT".to_string(), json_string(format.as_str()));
    if format == Format::Cjs && options.shims {
        define.insert("import.meta.url".to_string(), "importMetaUrl".to_string());
    }
    define.extend(options.define.clone());

    for (key, value) in env(options) {
        let value = json_string(&value);
        define.insert(format!("process.env.{key}"), value.clone());
        define.insert(format!("import.meta.env.{key}"), value);
    }
    define
}

fn env(options: &NormalizedOptions) -> IndexMap<String, String> {
    let mut env = options.env.clone();
    if options.replace_node_env {
        let mode = if options.minify.enabled() || options.minify_whitespace {
            "production"
        } else {
            "development"
        };
        env.insert("NODE_ENV".to_string(), mode.to_string());
    }
    env
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Remove output files before a build.
///
/// Everything under the output directory goes, minus `!` exclusions from
/// the `clean` list. Declarations are kept when a declaration task owns them.
pub fn clean_output(options: &NormalizedOptions) -> Result<usize> {
    let Some(extra) = &options.clean else {
        return Ok(0);
    };

    let mut patterns = vec!["**/*".to_string()];
    patterns.extend(extra.iter().cloned());
    if options.has_dts() {
        patterns.push(DECLARATION_GLOB.to_string());
    }
    remove_matching(&options.out_dir_path(), &patterns)
}

/// The file the metafile of `format` is written to.
pub fn metafile_path(options: &NormalizedOptions, format: Format) -> PathBuf {
    options.out_dir_path().join(format!("metafile-{format}.json"))
}
