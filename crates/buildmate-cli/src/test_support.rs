//! Fakes shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use buildmate_bundler::bundler::diagnostics::Message;
use buildmate_bundler::bundler::{
    BundledFile, MetaInput, MetaOutput, TransformOutput, TransformRequest,
};
use buildmate_bundler::options::Entry;
use buildmate_bundler::{
    BuildConfiguration, BundleOutcome, BundleRequest, Bundler, Error, Metafile, NormalizedOptions,
};

/// Writes `index<ext>` into the output directory and reports `inputs` as
/// the module graph.
#[derive(Default)]
pub struct ScriptedBundler {
    inputs: Vec<String>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedBundler {
    pub fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bundler for ScriptedBundler {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn bundle(&self, request: &BundleRequest) -> buildmate_bundler::Result<BundleOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Bundler(vec![Message::error("Expected \";\" but found \"}\"")]));
        }

        let ext = request.js_extension.clone().unwrap_or_else(|| ".js".to_string());
        let path = request.out_dir.join(format!("index{ext}"));
        let rel = path
            .strip_prefix(&request.cwd)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        let mut metafile = Metafile::default();
        for input in &self.inputs {
            metafile.inputs.insert(input.clone(), MetaInput::default());
        }
        metafile.outputs.insert(
            rel,
            MetaOutput {
                entry_point: self.inputs.first().cloned(),
                ..Default::default()
            },
        );

        Ok(BundleOutcome {
            files: vec![BundledFile {
                path,
                contents: b"export {};".to_vec(),
            }],
            metafile,
            warnings: Vec::new(),
        })
    }

    async fn transform(
        &self,
        code: &str,
        _request: &TransformRequest,
    ) -> buildmate_bundler::Result<TransformOutput> {
        Ok(TransformOutput {
            code: code.to_string(),
            map: None,
        })
    }
}

/// A single-entry configuration rooted at `cwd`.
pub fn configuration(
    cwd: &Path,
    edit: impl FnOnce(&mut NormalizedOptions),
) -> BuildConfiguration {
    let mut options = NormalizedOptions::new(cwd, Entry::List(vec!["src/index.ts".into()]));
    edit(&mut options);
    BuildConfiguration::new(options)
}
