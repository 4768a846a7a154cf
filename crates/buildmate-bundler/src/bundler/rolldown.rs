//! In-process bundling through Rolldown.
//!
//! Rolldown has no metafile, so one is synthesized from the output chunks:
//! entry points, exports and chunk-to-chunk imports, plus the module ids
//! each chunk was built from as inputs. Svelte components are read from a
//! [`SourceOverlay`]; decorators go through rolldown's own transform.

use std::path::Path;

use async_trait::async_trait;
use rolldown::{
    BundlerBuilder, BundlerOptions, InputItem, IsExternal, OutputFormat, RawMinifyOptions,
    SourceMapType,
};
use rolldown_common::{BundlerTransformOptions, DecoratorOptions, ModuleType, Output};
use rustc_hash::{FxHashMap, FxHashSet};

use super::diagnostics::Message;
use super::preload::{Preload, SourceOverlay};
use super::{
    BundleOutcome, BundleRequest, BundledFile, Bundler, BundlerExtension, EsbuildBundler,
    MetaImport, MetaInput, MetaOutput, Metafile, TransformOutput, TransformRequest,
};
use crate::options::{Format, Platform};
use crate::{Error, Result};

/// Bundles with Rolldown. Single-chunk transforms go to esbuild when it can
/// be found, and pass code through unchanged otherwise.
#[derive(Debug, Default)]
pub struct RolldownBundler {
    transformer: Option<EsbuildBundler>,
}

impl RolldownBundler {
    pub fn new(cwd: &Path) -> Self {
        Self {
            transformer: EsbuildBundler::locate(cwd).ok(),
        }
    }

    fn options(request: &BundleRequest) -> BundlerOptions {
        let input = request
            .entry
            .named()
            .into_iter()
            .map(|(name, file)| InputItem {
                name: Some(name),
                import: request.cwd.join(file).to_string_lossy().into_owned(),
            })
            .collect();

        let external = request
            .externals()
            .map(|set| set.bundler_patterns())
            .unwrap_or_default();

        let mut options = BundlerOptions {
            input: Some(input),
            cwd: Some(request.cwd.clone()),
            format: Some(match request.format {
                Format::Cjs => OutputFormat::Cjs,
                Format::Esm => OutputFormat::Esm,
                Format::Iife => OutputFormat::Iife,
            }),
            platform: Some(match request.platform {
                Platform::Node => rolldown::Platform::Node,
                Platform::Browser => rolldown::Platform::Browser,
                Platform::Neutral => rolldown::Platform::Neutral,
            }),
            external: Some(IsExternal::from(external)),
            ..Default::default()
        };

        if request.sourcemap {
            options.sourcemap = Some(SourceMapType::File);
        }
        if request.minify_any() {
            options.minify = Some(RawMinifyOptions::from(true));
        }
        if request.has_extension(&BundlerExtension::DecoratorMetadata) {
            options.transform = Some(BundlerTransformOptions {
                decorator: Some(DecoratorOptions {
                    legacy: Some(true),
                    emit_decorator_metadata: Some(true),
                }),
                ..Default::default()
            });
        }
        if request.has_extension(&BundlerExtension::Svelte) {
            options.module_types = Some(FxHashMap::from_iter([(
                ".svelte".to_string(),
                ModuleType::Ts,
            )]));
        }
        options
    }
}

fn relative_key(cwd: &Path, path: &Path) -> String {
    path.strip_prefix(cwd)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[async_trait]
impl Bundler for RolldownBundler {
    fn name(&self) -> &str {
        "rolldown"
    }

    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutcome> {
        // Decorators are compiled by rolldown's own transform.
        let preload = Preload {
            decorator_metadata: false,
            ..Preload::for_request(request)
        };
        let overlay = SourceOverlay::for_request(request, preload).await?;
        let staged = overlay.as_ref().map(|overlay| overlay.request(request));
        let request = staged.as_ref().unwrap_or(request);

        let mut bundler = BundlerBuilder::default()
            .with_options(Self::options(request))
            .build()
            .map_err(|e| Error::Bundler(vec![Message::error(format!("{e:?}"))]))?;

        let output = bundler
            .generate()
            .await
            .map_err(|e| Error::Bundler(vec![Message::error(format!("{e:?}"))]))?;

        let mut outcome = BundleOutcome::default();

        let asset_names: FxHashSet<String> = output
            .assets
            .iter()
            .filter_map(|item| match item {
                Output::Asset(asset) => Some(asset.filename.to_string()),
                Output::Chunk(_) => None,
            })
            .collect();

        let cwd = &request.cwd;
        let mut metafile = Metafile::default();

        for item in &output.assets {
            match item {
                Output::Chunk(chunk) => {
                    let path = request.out_dir.join(chunk.filename.as_str());
                    let map_name = format!("{}.map", chunk.filename);
                    if let Some(map) = &chunk.map {
                        if !asset_names.contains(&map_name) {
                            outcome.files.push(BundledFile {
                                path: request.out_dir.join(&map_name),
                                contents: map.to_json_string().into_bytes(),
                            });
                        }
                    }

                    for id in &chunk.module_ids {
                        let id = id.to_string();
                        if id.starts_with('\0') {
                            continue;
                        }
                        metafile
                            .inputs
                            .entry(relative_key(cwd, Path::new(&id)))
                            .or_insert_with(MetaInput::default);
                    }

                    metafile.outputs.insert(
                        relative_key(cwd, &path),
                        MetaOutput {
                            bytes: chunk.code.len() as u64,
                            imports: chunk
                                .imports
                                .iter()
                                .map(|import| MetaImport {
                                    path: relative_key(
                                        cwd,
                                        &request.out_dir.join(import.as_str()),
                                    ),
                                    kind: "import-statement".to_string(),
                                    external: false,
                                })
                                .collect(),
                            exports: chunk.exports.iter().map(|e| e.to_string()).collect(),
                            entry_point: chunk
                                .is_entry
                                .then(|| chunk.facade_module_id.as_ref())
                                .flatten()
                                .map(|id| relative_key(cwd, Path::new(&id.to_string()))),
                            css_bundle: None,
                        },
                    );

                    outcome.files.push(BundledFile {
                        path,
                        contents: chunk.code.clone().into_bytes(),
                    });
                }
                Output::Asset(asset) => {
                    outcome.files.push(BundledFile {
                        path: request.out_dir.join(asset.filename.as_str()),
                        contents: asset.source.as_bytes().to_vec(),
                    });
                }
            }
        }

        outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
        outcome.metafile = metafile;
        if let Some(overlay) = &overlay {
            overlay.restore(&mut outcome);
        }
        Ok(outcome)
    }

    async fn transform(&self, code: &str, request: &TransformRequest) -> Result<TransformOutput> {
        match &self.transformer {
            Some(esbuild) => esbuild.transform(code, request).await,
            None => {
                tracing::debug!(
                    sourcefile = %request.sourcefile,
                    "no esbuild executable for chunk transforms, passing code through"
                );
                Ok(TransformOutput {
                    code: code.to_string(),
                    map: None,
                })
            }
        }
    }
}
