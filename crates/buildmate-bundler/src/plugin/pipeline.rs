use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::sourcemap;
use super::{Asset, Chunk, Plugin, PluginContext, WrittenFile, is_css, is_js, is_map};
use crate::bundler::{BundleRequest, BundledFile, Metafile};
use crate::options::SourceMapMode;
use crate::output::writer;
use crate::{Error, Result, glob};

/// Where a pipeline is within one build pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    ContextSet,
    BuildStarted,
    ChunksRendered,
    BuildFinished,
}

enum Output {
    Chunk(Chunk),
    Asset(Asset),
}

/// Runs registered plugins over one format's build pass.
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
    context: Option<PluginContext>,
    state: PassState,
}

impl PluginPipeline {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            plugins,
            context: None,
            state: PassState::Idle,
        }
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Install the per-pass context. Starts a new pass.
    pub fn set_context(&mut self, ctx: PluginContext) {
        self.context = Some(ctx);
        self.state = PassState::ContextSet;
    }

    pub fn context(&self) -> Result<&PluginContext> {
        self.context.as_ref().ok_or(Error::ContextNotSet)
    }

    pub fn modify_bundle_options(&self, request: &mut BundleRequest) -> Result<()> {
        let ctx = self.context()?;
        for plugin in &self.plugins {
            plugin
                .modify_bundle_options(ctx, request)
                .map_err(|e| plugin_error(plugin.as_ref(), e))?;
        }
        Ok(())
    }

    pub async fn build_started(&mut self) -> Result<()> {
        let ctx = self.context()?.clone();
        for plugin in &self.plugins {
            plugin
                .build_start(&ctx)
                .await
                .map_err(|e| plugin_error(plugin.as_ref(), e))?;
        }
        self.state = PassState::BuildStarted;
        Ok(())
    }

    /// Render, write and report every bundler output.
    ///
    /// Files are processed concurrently; each one runs the render hooks in
    /// registration order. A failure in one file does not stop the others
    /// from being written. The first error is returned once all have
    /// settled.
    pub async fn build_finished(
        &mut self,
        files: Vec<BundledFile>,
        metafile: &Metafile,
    ) -> Result<Vec<WrittenFile>> {
        let ctx = self.context()?.clone();
        let outputs = classify(&ctx, files, metafile)?;
        let written: Mutex<Vec<WrittenFile>> = Mutex::new(Vec::with_capacity(outputs.len()));

        let results = join_all(
            outputs
                .into_iter()
                .map(|output| self.process(&ctx, output, &written)),
        )
        .await;
        self.state = PassState::ChunksRendered;

        for result in results {
            result?;
        }
        self.state = PassState::BuildFinished;
        Ok(written.into_inner())
    }

    async fn process(
        &self,
        ctx: &PluginContext,
        output: Output,
        written: &Mutex<Vec<WrittenFile>>,
    ) -> Result<()> {
        let files = match output {
            Output::Chunk(chunk) => {
                let chunk = self.render(ctx, chunk).await?;
                persist_chunk(ctx, chunk).await?
            }
            Output::Asset(asset) => {
                let base = ctx.options.out_dir_path();
                let path = writer::write_file(&base, &asset.path, &asset.contents, None).await?;
                vec![WrittenFile::new(path, &ctx.options.cwd, Arc::from(asset.contents))]
            }
        };

        let snapshot = {
            let mut written = written.lock();
            written.extend(files);
            written.clone()
        };
        for plugin in &self.plugins {
            plugin
                .build_end(ctx, &snapshot)
                .await
                .map_err(|e| plugin_error(plugin.as_ref(), e))?;
        }
        Ok(())
    }

    async fn render(&self, ctx: &PluginContext, mut chunk: Chunk) -> Result<Chunk> {
        for plugin in &self.plugins {
            let rendered = plugin
                .render_chunk(ctx, &mut chunk)
                .await
                .map_err(|e| plugin_error(plugin.as_ref(), e))?;
            let Some(rendered) = rendered else {
                continue;
            };
            let file = chunk.file_name();
            chunk.map = sourcemap::chain(chunk.map.take(), rendered.map, Some(&file));
            chunk.code = rendered.code;
        }
        Ok(chunk)
    }
}

fn plugin_error(plugin: &dyn Plugin, err: Error) -> Error {
    match err {
        Error::Plugin { .. } => err,
        other => Error::plugin(plugin.name(), other),
    }
}

fn classify(ctx: &PluginContext, files: Vec<BundledFile>, metafile: &Metafile) -> Result<Vec<Output>> {
    let (maps, files): (Vec<BundledFile>, Vec<BundledFile>) =
        files.into_iter().partition(|file| is_map(&file.path));
    let mut maps: FxHashMap<PathBuf, Vec<u8>> =
        maps.into_iter().map(|m| (m.path, m.contents)).collect();

    let mut outputs = Vec::with_capacity(files.len());
    for file in files {
        if !(is_js(&file.path) || is_css(&file.path)) {
            outputs.push(Output::Asset(Asset {
                path: file.path,
                contents: file.contents,
            }));
            continue;
        }

        let code = String::from_utf8(file.contents).map_err(|e| {
            Error::WriteFailure(format!("{} is not valid UTF-8: {e}", file.path.display()))
        })?;
        let mut chunk = Chunk::new(
            file.path.clone(),
            sourcemap::strip_reference_comment(&code).to_string(),
        );

        let mut map_path = file.path.clone().into_os_string();
        map_path.push(".map");
        if let Some(json) = maps.remove(&PathBuf::from(map_path)) {
            chunk.map = Some(sourcemap::parse(&String::from_utf8_lossy(&json))?);
        }

        let key = file
            .path
            .strip_prefix(&ctx.options.cwd)
            .map(|rel| glob::slash(&rel.to_string_lossy()))
            .unwrap_or_default();
        if let Some(meta) = metafile.outputs.get(&key) {
            chunk.entry_point = meta.entry_point.clone();
            chunk.exports = meta.exports.clone();
            chunk.imports = meta.imports.clone();
        }

        outputs.push(Output::Chunk(chunk));
    }
    Ok(outputs)
}

/// Write a chunk, its reference comment and (for external maps) its `.map`
/// file. The map is written only after the chunk itself and is listed
/// after it.
async fn persist_chunk(ctx: &PluginContext, chunk: Chunk) -> Result<Vec<WrittenFile>> {
    let base = ctx.options.out_dir_path();
    let mode = ctx.options.sourcemap;
    let mut code = chunk.code;
    let mut map_file = None;

    if mode.enabled() {
        if let Some(map) = &chunk.map {
            let inline = mode == SourceMapMode::Inline;
            if !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&sourcemap::reference_comment(&chunk.path, map, inline));
            code.push('\n');
            if !inline {
                let mut path = chunk.path.clone().into_os_string();
                path.push(".map");
                map_file = Some((PathBuf::from(path), map.to_json_string()));
            }
        }
    }

    let contents: Arc<[u8]> = Arc::from(code.into_bytes());
    let path = writer::write_file(&base, &chunk.path, &contents, chunk.mode).await?;
    let mut files = vec![WrittenFile::new(path, &ctx.options.cwd, contents)];
    if let Some((map_path, json)) = map_file {
        let contents: Arc<[u8]> = Arc::from(json.into_bytes());
        let path = writer::write_file(&base, &map_path, &contents, None).await?;
        files.push(WrittenFile::new(path, &ctx.options.cwd, contents));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::MetaOutput;
    use crate::bundler::testing::StubBundler;
    use crate::logger::{Logger, MemorySink};
    use crate::options::{Entry, Format, NormalizedOptions};
    use crate::plugin::RenderedChunk;
    use async_trait::async_trait;
    use oxc_sourcemap::SourceMapBuilder;
    use tempfile::TempDir;

    struct Prepend(&'static str);

    #[async_trait]
    impl Plugin for Prepend {
        fn name(&self) -> &str {
            "prepend"
        }

        async fn render_chunk(
            &self,
            _ctx: &PluginContext,
            chunk: &mut Chunk,
        ) -> Result<Option<RenderedChunk>> {
            Ok(Some(RenderedChunk::code(format!("{}{}", self.0, chunk.code))))
        }
    }

    /// Appends a marker and remembers the code it was handed.
    #[derive(Default)]
    struct Append {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Plugin for Append {
        fn name(&self) -> &str {
            "append"
        }

        async fn render_chunk(
            &self,
            _ctx: &PluginContext,
            chunk: &mut Chunk,
        ) -> Result<Option<RenderedChunk>> {
            self.seen.lock().push(chunk.code.clone());
            Ok(Some(RenderedChunk::code(format!("{}B", chunk.code))))
        }
    }

    struct FailOn(&'static str);

    #[async_trait]
    impl Plugin for FailOn {
        fn name(&self) -> &str {
            "fail-on"
        }

        async fn render_chunk(
            &self,
            _ctx: &PluginContext,
            chunk: &mut Chunk,
        ) -> Result<Option<RenderedChunk>> {
            if chunk.file_name() == self.0 {
                return Err(Error::Config("boom".into()));
            }
            Ok(None)
        }
    }

    #[derive(Default)]
    struct EndCounter {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Plugin for EndCounter {
        fn name(&self) -> &str {
            "end-counter"
        }

        async fn build_end(&self, _ctx: &PluginContext, files: &[WrittenFile]) -> Result<()> {
            self.calls.lock().push(files.len());
            Ok(())
        }
    }

    fn context(dir: &TempDir) -> PluginContext {
        let mut options = NormalizedOptions::new(dir.path(), Entry::List(vec!["src/index.ts".into()]));
        options.sourcemap = SourceMapMode::External;
        PluginContext {
            format: Format::Cjs,
            splitting: false,
            options: Arc::new(options),
            logger: Logger::memory(MemorySink::new()),
            bundler: Arc::new(StubBundler::default()),
        }
    }

    fn bundled(dir: &TempDir, name: &str, contents: &str) -> BundledFile {
        BundledFile {
            path: dir.path().join("dist").join(name),
            contents: contents.as_bytes().to_vec(),
        }
    }

    async fn run(plugins: Vec<Arc<dyn Plugin>>, dir: &TempDir, files: Vec<BundledFile>) -> Result<Vec<WrittenFile>> {
        let mut pipeline = PluginPipeline::new(plugins);
        pipeline.set_context(context(dir));
        pipeline.build_started().await?;
        pipeline.build_finished(files, &Metafile::default()).await
    }

    #[tokio::test]
    async fn hooks_require_context() {
        let mut pipeline = PluginPipeline::new(Vec::new());
        assert_eq!(pipeline.state(), PassState::Idle);
        let err = pipeline.build_started().await.unwrap_err();
        assert!(matches!(err, Error::ContextNotSet));
        assert_eq!(err.to_string(), "Plugin context is not set");
    }

    #[tokio::test]
    async fn registration_order_is_transform_order() {
        let dir = TempDir::new().unwrap();
        let append = Arc::new(Append::default());
        run(
            vec![Arc::new(Prepend("A")), append.clone()],
            &dir,
            vec![bundled(&dir, "index.js", "code")],
        )
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("dist/index.js")).unwrap(),
            "AcodeB"
        );
        assert_eq!(append.seen.lock().as_slice(), ["Acode"]);

        let dir = TempDir::new().unwrap();
        let append = Arc::new(Append::default());
        run(
            vec![append.clone(), Arc::new(Prepend("A"))],
            &dir,
            vec![bundled(&dir, "index.js", "code")],
        )
        .await
        .unwrap();
        assert_eq!(append.seen.lock().as_slice(), ["code"]);
    }

    #[tokio::test]
    async fn failing_chunk_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let err = run(
            vec![Arc::new(FailOn("bad.js"))],
            &dir,
            vec![bundled(&dir, "bad.js", "x"), bundled(&dir, "good.js", "y")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Plugin { ref plugin, .. } if plugin == "fail-on"));
        assert!(dir.path().join("dist/good.js").exists());
        assert!(!dir.path().join("dist/bad.js").exists());
    }

    #[tokio::test]
    async fn end_hook_sees_accumulating_files() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(EndCounter::default());
        let written = run(
            vec![counter.clone()],
            &dir,
            vec![
                bundled(&dir, "a.js", "a"),
                bundled(&dir, "b.css", "b{}"),
                bundled(&dir, "logo.png", "png"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(written.len(), 3);
        let mut calls = counter.calls.lock().clone();
        calls.sort();
        assert_eq!(calls, vec![1, 2, 3]);
        let png = written.iter().find(|f| f.name().ends_with("logo.png")).unwrap();
        assert_eq!(png.name(), "dist/logo.png");
        assert_eq!(png.size(), 3);
    }

    #[tokio::test]
    async fn sibling_map_is_attached_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let mut builder = SourceMapBuilder::default();
        let id = builder.add_source_and_content("../src/index.ts", "export const a = 1");
        builder.add_token(0, 0, 0, 0, Some(id), None);
        let map = builder.into_sourcemap();

        let mut meta = Metafile::default();
        meta.outputs.insert(
            "dist/index.js".into(),
            MetaOutput {
                entry_point: Some("src/index.ts".into()),
                exports: vec!["a".into()],
                ..MetaOutput::default()
            },
        );

        let mut pipeline = PluginPipeline::new(vec![Arc::new(Prepend("/* banner */\n"))]);
        pipeline.set_context(context(&dir));
        let written = pipeline
            .build_finished(
                vec![
                    bundled(&dir, "index.js", "var a = 1;\n//# sourceMappingURL=index.js.map\n"),
                    bundled(&dir, "index.js.map", &map.to_json_string()),
                ],
                &meta,
            )
            .await
            .unwrap();
        assert_eq!(pipeline.state(), PassState::BuildFinished);

        let code = std::fs::read_to_string(dir.path().join("dist/index.js")).unwrap();
        assert_eq!(
            code,
            "/* banner */\nvar a = 1;\n//# sourceMappingURL=index.js.map\n"
        );
        let written_map = std::fs::read_to_string(dir.path().join("dist/index.js.map")).unwrap();
        assert!(written_map.contains("../src/index.ts"));

        let names: Vec<String> = written.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["dist/index.js", "dist/index.js.map"]);
        assert_eq!(written[1].size(), written_map.len());
    }
}
