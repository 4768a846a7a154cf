//! The per-target build configuration.
//!
//! [`BuildConfiguration`] pairs the serializable [`NormalizedOptions`] with the
//! parts that cannot leave the process: plugin objects, an on-success callback
//! and a custom output-extension function. [`WorkerOptions`] is the explicit
//! serializable projection handed to the declaration worker.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::options::{
    DtsConfig, Entry, Format, NormalizedOptions, OutExtension, WatchMode, default_out_extension,
};
use crate::plugin::Plugin;

/// Undo for an on-success callback; run before the next build pass.
pub type Cleanup = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub type SuccessCallback =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Option<Cleanup>>> + Send + Sync>;

pub type OutExtensionFn = Arc<dyn Fn(Format, Option<&str>) -> OutExtension + Send + Sync>;

/// What to run after a successful build pass.
#[derive(Clone)]
pub enum OnSuccess {
    /// Shell command, spawned as a child process.
    Command(String),
    /// In-process callback; may return a cleanup.
    Callback(SuccessCallback),
}

impl fmt::Debug for OnSuccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnSuccess::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            OnSuccess::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Clone)]
pub struct BuildConfiguration {
    pub options: Arc<NormalizedOptions>,
    /// User plugins; they run after the built-ins.
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub on_success: Option<OnSuccess>,
    pub out_extension: Option<OutExtensionFn>,
}

impl fmt::Debug for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfiguration")
            .field("options", &self.options)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("on_success", &self.on_success)
            .field("out_extension", &self.out_extension.is_some())
            .finish()
    }
}

impl BuildConfiguration {
    pub fn new(options: NormalizedOptions) -> Self {
        let on_success = options.on_success.clone().map(OnSuccess::Command);
        Self {
            options: Arc::new(options),
            plugins: Vec::new(),
            on_success,
            out_extension: None,
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_on_success(mut self, on_success: OnSuccess) -> Self {
        self.on_success = Some(on_success);
        self
    }

    pub fn with_out_extension(mut self, out_extension: OutExtensionFn) -> Self {
        self.out_extension = Some(out_extension);
        self
    }

    pub fn out_extension(&self, format: Format, package_type: Option<&str>) -> OutExtension {
        match &self.out_extension {
            Some(custom) => custom(format, package_type),
            None => default_out_extension(format, package_type),
        }
    }

    /// The declaration worker's view of this configuration.
    ///
    /// A missing `dts.entry` defaults to the main entry.
    pub fn worker_options(&self, package_type: Option<&str>) -> WorkerOptions {
        let options = &self.options;
        let dts = options.dts.clone().map(|mut dts| {
            if dts.entry.is_none() {
                dts.entry = Some(options.entry.clone());
            }
            dts
        });
        let outputs = options
            .format
            .iter()
            .map(|&format| DtsOutput {
                format,
                out_dir: options.format_out_dir(format),
                extension: if options.legacy_output {
                    ".d.ts".to_string()
                } else {
                    self.out_extension(format, package_type).dts.to_string()
                },
            })
            .collect();

        WorkerOptions {
            name: options.name.clone(),
            cwd: options.cwd.clone(),
            entry: options.entry.clone(),
            out_dir: options.out_dir_path(),
            outputs,
            dts,
            external: options.external.clone(),
            no_external: options.no_external.clone(),
            clean: options.clean.is_some(),
            watch: options.watch.clone(),
            ignore_watch: options.ignore_watch.clone(),
            cjs_interop: options.cjs_interop,
            silent: options.silent,
            tsconfig: options.tsconfig.clone(),
            tsconfig_resolve_paths: options.tsconfig_resolve_paths.clone(),
        }
    }
}

/// Where one format's declarations go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtsOutput {
    pub format: Format,
    pub out_dir: PathBuf,
    /// `.d.ts`, `.d.cts` or `.d.mts`.
    pub extension: String,
}

/// Serializable subset of a [`BuildConfiguration`] for the declaration
/// worker. Contains no callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOptions {
    pub name: Option<String>,
    pub cwd: PathBuf,
    pub entry: Entry,
    pub out_dir: PathBuf,
    pub outputs: Vec<DtsOutput>,
    pub dts: Option<DtsConfig>,
    pub external: Vec<String>,
    pub no_external: Vec<String>,
    pub clean: bool,
    pub watch: WatchMode,
    pub ignore_watch: Vec<String>,
    pub cjs_interop: bool,
    pub silent: bool,
    pub tsconfig: Option<PathBuf>,
    pub tsconfig_resolve_paths: IndexMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> NormalizedOptions {
        let mut opts = NormalizedOptions::new(
            "/p",
            Entry::Map(IndexMap::from([("main".to_string(), "src/index.ts".to_string())])),
        );
        opts.format = vec![Format::Cjs, Format::Esm];
        opts.dts = Some(DtsConfig::default());
        opts
    }

    #[test]
    fn dts_entry_defaults_to_main_entry() {
        let worker = BuildConfiguration::new(options()).worker_options(None);
        assert_eq!(
            worker.dts.unwrap().entry,
            Some(Entry::Map(IndexMap::from([(
                "main".to_string(),
                "src/index.ts".to_string()
            )])))
        );
    }

    #[test]
    fn outputs_follow_extension_policy() {
        let worker = BuildConfiguration::new(options()).worker_options(Some("module"));
        let exts: Vec<(Format, &str)> = worker
            .outputs
            .iter()
            .map(|o| (o.format, o.extension.as_str()))
            .collect();
        assert_eq!(exts, vec![(Format::Cjs, ".d.cts"), (Format::Esm, ".d.ts")]);
    }

    #[test]
    fn custom_out_extension_wins() {
        let config = BuildConfiguration::new(options()).with_out_extension(Arc::new(|_, _| {
            OutExtension {
                js: ".bundle.js",
                dts: ".types.d.ts",
            }
        }));
        assert_eq!(config.out_extension(Format::Esm, None).js, ".bundle.js");
        assert_eq!(config.worker_options(None).outputs[0].extension, ".types.d.ts");
    }

    #[test]
    fn on_success_command_comes_from_options() {
        let mut opts = options();
        opts.on_success = Some("node dist/index.js".into());
        let config = BuildConfiguration::new(opts);
        assert!(matches!(config.on_success, Some(OnSuccess::Command(ref c)) if c == "node dist/index.js"));
    }

    #[test]
    fn worker_options_cross_json() {
        let worker = BuildConfiguration::new(options()).worker_options(None);
        let json = serde_json::to_string(&worker).unwrap();
        let back: WorkerOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, worker);
    }
}
