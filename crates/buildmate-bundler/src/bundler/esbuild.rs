//! esbuild executable backend.
//!
//! Bundles are written to a staging directory next to the real output
//! directory (so relative source-map paths stay valid), read back and handed
//! to the pipeline with their final paths. Nothing lands in the output
//! directory until the pipeline writes it. Sources that need a load-time
//! transform are bundled from a [`SourceOverlay`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use path_clean::PathClean;
use regex::Regex;
use tokio::process::Command;

use super::diagnostics::{self, Message, Severity};
use super::preload::{Preload, SourceOverlay};
use super::{
    BundleOutcome, BundleRequest, BundledFile, Bundler, BundlerExtension, Metafile, TransformOutput,
    TransformRequest,
};
use crate::options::Entry;
use crate::plugin::sourcemap;
use crate::{Error, Result, glob};

/// Overrides the executable lookup.
pub const BINARY_ENV: &str = "ESBUILD_BINARY_PATH";

static NODE_REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\((["'])node:"#).unwrap());

#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    binary: PathBuf,
}

impl EsbuildBundler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Find the executable: `ESBUILD_BINARY_PATH`, then
    /// `node_modules/.bin/esbuild` in `cwd` or any ancestor, then `PATH`.
    pub fn locate(cwd: &Path) -> Result<Self> {
        if let Some(path) = std::env::var_os(BINARY_ENV) {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(Self::new(path));
            }
            return Err(Error::BundlerUnavailable(format!(
                "{BINARY_ENV} points at {}, which does not exist",
                path.display()
            )));
        }

        for dir in cwd.ancestors() {
            for name in binary_names() {
                let candidate = dir.join("node_modules").join(".bin").join(name);
                if candidate.is_file() {
                    return Ok(Self::new(candidate));
                }
            }
        }

        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                for name in binary_names() {
                    let candidate = dir.join(name);
                    if candidate.is_file() {
                        return Ok(Self::new(candidate));
                    }
                }
            }
        }

        Err(Error::BundlerUnavailable(format!(
            "could not find the esbuild executable from {}",
            cwd.display()
        )))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, cwd: &Path, args: &[String]) -> Result<(bool, String)> {
        tracing::debug!(binary = %self.binary.display(), ?args, "running esbuild");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::BundlerUnavailable(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

fn binary_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["esbuild.cmd", "esbuild.exe"]
    } else {
        &["esbuild"]
    }
}

/// Split stderr into errors and warnings. A failed run with no parseable
/// error still yields one, carrying the raw text.
fn split_messages(stderr: &str, failed: bool) -> (Vec<Message>, Vec<Message>) {
    let (errors, warnings): (Vec<Message>, Vec<Message>) = diagnostics::parse(stderr)
        .into_iter()
        .partition(|m| m.severity == Severity::Error);
    if failed && errors.is_empty() {
        let text = stderr.trim();
        let text = if text.is_empty() { "Build failed" } else { text };
        return (vec![Message::error(text)], warnings);
    }
    (errors, warnings)
}

pub(crate) fn bundle_args(request: &BundleRequest, outdir: &Path, metafile: &Path) -> Vec<String> {
    let mut args = Vec::new();

    match &request.entry {
        Entry::List(files) => args.extend(files.iter().cloned()),
        Entry::Map(map) => args.extend(map.iter().map(|(name, file)| format!("{name}={file}"))),
    }

    if request.bundle {
        args.push("--bundle".into());
    }
    args.push(format!("--format={}", request.format));
    args.push(format!("--platform={}", request.platform.as_str()));
    if !request.target.is_empty() {
        args.push(format!("--target={}", request.target.join(",")));
    }
    args.push(format!("--outdir={}", outdir.display()));
    if let Some(ext) = &request.js_extension {
        args.push(format!("--out-extension:.js={ext}"));
    }
    if request.splitting {
        args.push("--splitting".into());
    }
    if request.sourcemap {
        args.push("--sourcemap=external".into());
    }
    if request.minify_whitespace {
        args.push("--minify-whitespace".into());
    }
    if request.minify_identifiers {
        args.push("--minify-identifiers".into());
    }
    if request.minify_syntax {
        args.push("--minify-syntax".into());
    }
    if request.keep_names {
        args.push("--keep-names".into());
    }
    for (key, value) in &request.define {
        args.push(format!("--define:{key}={value}"));
    }
    for file in &request.inject {
        args.push(format!("--inject:{}", file.display()));
    }

    let mut loader = request.loader.clone();
    if request.has_extension(&BundlerExtension::NativeNodeModules) {
        loader
            .entry(".node".to_string())
            .or_insert_with(|| "file".to_string());
    }
    if request.has_extension(&BundlerExtension::Svelte) {
        // Component scripts may be TypeScript; the ts loader also reads JS.
        loader
            .entry(".svelte".to_string())
            .or_insert_with(|| "ts".to_string());
    }
    for (ext, kind) in &loader {
        args.push(format!("--loader:{ext}={kind}"));
    }

    if !request.main_fields.is_empty() {
        args.push(format!("--main-fields={}", request.main_fields.join(",")));
    }
    if let Some(name) = &request.global_name {
        args.push(format!("--global-name={name}"));
    }
    if let Some(factory) = &request.jsx_factory {
        args.push(format!("--jsx-factory={factory}"));
    }
    if let Some(fragment) = &request.jsx_fragment {
        args.push(format!("--jsx-fragment={fragment}"));
    }
    for name in &request.pure {
        args.push(format!("--pure:{name}"));
    }
    for (flag, banner) in [("banner", &request.banner), ("footer", &request.footer)] {
        if let Some(js) = &banner.js {
            args.push(format!("--{flag}:js={js}"));
        }
        if let Some(css) = &banner.css {
            args.push(format!("--{flag}:css={css}"));
        }
    }
    if let Some(tsconfig) = &request.tsconfig {
        args.push(format!("--tsconfig={}", tsconfig.display()));
    }

    if request.has_extension(&BundlerExtension::NodeProtocol) {
        args.push("--external:node:*".into());
    }
    if let Some(externals) = request.externals() {
        if externals.skip_node_modules {
            args.push("--packages=external".into());
        }
        for pattern in externals.bundler_patterns() {
            args.push(format!("--external:{pattern}"));
        }
    }

    args.push(format!("--metafile={}", metafile.display()));
    args.push("--log-level=warning".into());
    args.push("--log-limit=0".into());
    args.push("--color=false".into());
    args
}

/// Rewrites paths under `from` to the same relative path under `to`.
struct Relocate<'a> {
    cwd: &'a Path,
    from: &'a Path,
    to: &'a Path,
}

impl Relocate<'_> {
    /// `key` is relative to `cwd` with forward slashes.
    fn key(&self, key: &str) -> String {
        let absolute = self.cwd.join(key).clean();
        match absolute.strip_prefix(self.from) {
            Ok(rel) => {
                let moved = self.to.join(rel);
                let moved = moved.strip_prefix(self.cwd).unwrap_or(&moved);
                glob::slash(&moved.to_string_lossy())
            }
            Err(_) => key.to_string(),
        }
    }

    fn metafile(&self, metafile: Metafile) -> Metafile {
        let outputs = metafile
            .outputs
            .into_iter()
            .map(|(key, mut output)| {
                for import in output.imports.iter_mut() {
                    if !import.external {
                        import.path = self.key(&import.path);
                    }
                }
                output.css_bundle = output.css_bundle.map(|css| self.key(&css));
                (self.key(&key), output)
            })
            .collect();
        Metafile {
            inputs: metafile.inputs,
            outputs,
        }
    }
}

fn strip_node_protocol(files: &mut [BundledFile]) {
    for file in files.iter_mut() {
        if !crate::plugin::is_js(&file.path) {
            continue;
        }
        let Ok(code) = std::str::from_utf8(&file.contents) else {
            continue;
        };
        if let std::borrow::Cow::Owned(rewritten) = NODE_REQUIRE.replace_all(code, "require($1") {
            file.contents = rewritten.into_bytes();
        }
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    fn name(&self) -> &str {
        "esbuild"
    }

    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutcome> {
        let overlay = SourceOverlay::for_request(request, Preload::for_request(request)).await?;
        let staged = overlay.as_ref().map(|overlay| overlay.request(request));
        let request = staged.as_ref().unwrap_or(request);

        let out_dir = if request.out_dir.is_absolute() {
            request.out_dir.clone()
        } else {
            request.cwd.join(&request.out_dir)
        }
        .clean();
        let parent = out_dir.parent().unwrap_or(&request.cwd).to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        // Same depth as the real output directory.
        let staging = tempfile::Builder::new()
            .prefix(".build-mate-")
            .tempdir_in(&parent)?;
        let outdir = staging.path().to_path_buf();
        let scratch = tempfile::Builder::new().prefix("build-mate-meta-").tempdir()?;
        let metafile_path = scratch.path().join("metafile.json");

        let args = bundle_args(request, &outdir, &metafile_path);
        let (success, stderr) = self.run(&request.cwd, &args).await?;
        let (mut errors, warnings) = split_messages(&stderr, !success);
        if !success {
            if let Some(overlay) = &overlay {
                overlay.restore_messages(&mut errors);
            }
            return Err(Error::Bundler(errors));
        }

        let metafile: Metafile = match tokio::fs::read_to_string(&metafile_path).await {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| Error::Bundler(vec![Message::error(format!("invalid metafile: {e}"))]))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Metafile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for path in glob::walk_files(&outdir) {
            let Ok(rel) = path.strip_prefix(&outdir) else {
                continue;
            };
            let contents = tokio::fs::read(&path).await?;
            files.push(BundledFile {
                path: out_dir.join(rel),
                contents,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        if request.has_extension(&BundlerExtension::NodeProtocol) {
            strip_node_protocol(&mut files);
        }

        let cwd = request.cwd.clean();
        let metafile = Relocate {
            cwd: &cwd,
            from: &outdir,
            to: &out_dir,
        }
        .metafile(metafile);

        let mut outcome = BundleOutcome {
            files,
            metafile,
            warnings,
        };
        if let Some(overlay) = &overlay {
            overlay.restore(&mut outcome);
        }
        Ok(outcome)
    }

    async fn transform(&self, code: &str, request: &TransformRequest) -> Result<TransformOutput> {
        let scratch = tempfile::Builder::new().prefix("build-mate-transform-").tempdir()?;
        let name = Path::new(&request.sourcefile)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "chunk.js".to_string());
        let input = scratch.path().join(&name);
        let output = scratch.path().join("out").join(&name);
        tokio::fs::write(&input, code).await?;

        let mut args = vec![
            input.display().to_string(),
            format!("--outfile={}", output.display()),
            "--loader:.js=js".to_string(),
            "--loader:.cjs=js".to_string(),
            "--loader:.mjs=js".to_string(),
            "--log-level=warning".to_string(),
            "--color=false".to_string(),
        ];
        if let Some(format) = request.format {
            args.push(format!("--format={format}"));
        }
        if let Some(target) = &request.target {
            args.push(format!("--target={target}"));
        }
        if let Some(platform) = request.platform {
            args.push(format!("--platform={}", platform.as_str()));
        }
        if request.minify {
            args.push("--minify".into());
        }
        if request.keep_names {
            args.push("--keep-names".into());
        }
        if request.tree_shaking {
            args.push("--tree-shaking=true".into());
        }
        if request.sourcemap {
            args.push("--sourcemap=external".into());
        }
        if let Some(name) = &request.global_name {
            args.push(format!("--global-name={name}"));
        }

        let (success, stderr) = self.run(scratch.path(), &args).await?;
        if !success {
            let (mut errors, _) = split_messages(&stderr, true);
            for error in errors.iter_mut() {
                if let Some(location) = error.location.as_mut() {
                    location.file = request.sourcefile.clone();
                }
            }
            return Err(Error::Bundler(errors));
        }

        let code = tokio::fs::read_to_string(&output).await?;
        let map = if request.sourcemap {
            let mut map_path = output.clone().into_os_string();
            map_path.push(".map");
            match tokio::fs::read_to_string(PathBuf::from(map_path)).await {
                Ok(json) => Some(sourcemap::parse(&json)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        Ok(TransformOutput {
            code: sourcemap::strip_reference_comment(&code).to_string(),
            map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::ExternalSet;
    use crate::options::{Format, NormalizedOptions};
    use indexmap::IndexMap;

    fn request() -> BundleRequest {
        let options = NormalizedOptions::new(
            "/p",
            Entry::Map(IndexMap::from([("main".to_string(), "src/index.ts".to_string())])),
        );
        BundleRequest::from_options(&options, Format::Cjs)
    }

    #[test]
    fn args_cover_entries_format_and_metafile() {
        let mut req = request();
        req.js_extension = Some(".cjs".into());
        req.define.insert("BUILD_MATE_FORMAT".into(), "\"cjs\"".into());
        let args = bundle_args(&req, Path::new("/p/.stage/out"), Path::new("/p/.stage/meta.json"));

        assert_eq!(args[0], "main=src/index.ts");
        for expected in [
            "--bundle",
            "--format=cjs",
            "--platform=node",
            "--target=node16",
            "--outdir=/p/.stage/out",
            "--out-extension:.js=.cjs",
            "--define:BUILD_MATE_FORMAT=\"cjs\"",
            "--metafile=/p/.stage/meta.json",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected} in {args:?}");
        }
        assert!(!args.iter().any(|a| a == "--splitting"));
    }

    #[test]
    fn extensions_become_flags() {
        let mut req = request();
        req.extensions = vec![
            BundlerExtension::NodeProtocol,
            BundlerExtension::NativeNodeModules,
            BundlerExtension::Svelte,
            BundlerExtension::Externals(ExternalSet {
                packages: vec!["react".into()],
                skip_node_modules: true,
                ..ExternalSet::default()
            }),
        ];
        let args = bundle_args(&req, Path::new("/o"), Path::new("/m"));
        for expected in [
            "--external:node:*",
            "--loader:.node=file",
            "--loader:.svelte=ts",
            "--packages=external",
            "--external:react",
            "--external:react/*",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }
    }

    #[test]
    fn relocates_metafile_outputs() {
        let relocate = Relocate {
            cwd: Path::new("/p"),
            from: Path::new("/p/.stage/out"),
            to: Path::new("/p/dist"),
        };
        let mut meta = Metafile::default();
        meta.outputs.insert(
            ".stage/out/index.js".into(),
            super::super::MetaOutput {
                css_bundle: Some(".stage/out/index.css".into()),
                ..Default::default()
            },
        );
        let meta = relocate.metafile(meta);
        let (key, output) = meta.outputs.first().unwrap();
        assert_eq!(key, "dist/index.js");
        assert_eq!(output.css_bundle.as_deref(), Some("dist/index.css"));
    }

    #[test]
    fn node_protocol_is_stripped_from_requires() {
        let mut files = vec![BundledFile {
            path: PathBuf::from("/p/dist/index.js"),
            contents: br#"const fs = require("node:fs"); const p = require('node:path');"#.to_vec(),
        }];
        strip_node_protocol(&mut files);
        assert_eq!(
            String::from_utf8(files.remove(0).contents).unwrap(),
            r#"const fs = require("fs"); const p = require('path');"#
        );
    }

    #[test]
    fn failure_without_parseable_errors_keeps_raw_text() {
        let (errors, warnings) = split_messages("segfault\n", true);
        assert_eq!(errors, vec![Message::error("segfault")]);
        assert!(warnings.is_empty());
    }
}
