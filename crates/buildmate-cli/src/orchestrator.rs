//! Top-level build driver.
//!
//! Loads the config file, applies the command-line overrides to each target
//! and runs every target concurrently: normalize, then the declaration task
//! next to the main build, then the watch loop or the on-success wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildmate_bundler::logger::ConsoleSink;
use buildmate_bundler::{
    BuildConfiguration, BuildEngine, Bundler, LogSettings, LogSink, Logger, normalize,
};
use buildmate_config::{ConfigDiscovery, LoadedConfig, Options};
use futures::future::join_all;

use crate::cli::{BuildArgs, ConfigSource};
use crate::dts::{DeclarationTask, ProcessTransport, WorkerTransport};
use crate::error::Result;
use crate::logger::should_use_colors;
use crate::watch::WatchController;

const LABEL: &str = "CLI";

pub struct Orchestrator {
    cwd: PathBuf,
    settings: Arc<LogSettings>,
    sink: Arc<dyn LogSink>,
    backend: Option<Arc<dyn Bundler>>,
    transport: Arc<dyn WorkerTransport>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cwd", &self.cwd)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Console output, the default bundler backend and a worker process.
    pub fn new(cwd: impl Into<PathBuf>, color: bool) -> Self {
        Self {
            cwd: cwd.into(),
            settings: LogSettings::new(color),
            sink: Arc::new(ConsoleSink),
            backend: None,
            transport: Arc::new(ProcessTransport::new(color)),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Bundler>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn WorkerTransport>) -> Self {
        self.transport = transport;
        self
    }

    fn logger(&self) -> Logger {
        Logger::new(Arc::clone(&self.settings), Arc::clone(&self.sink))
    }

    /// Build every configured target. Returns the process exit status.
    pub async fn run(&self, source: ConfigSource, overrides: Options) -> Result<i32> {
        let discovery = ConfigDiscovery::new(&self.cwd);
        let loaded = match source {
            ConfigSource::Discover => discovery.load()?,
            ConfigSource::Explicit(path) => discovery.load_explicit(path)?,
            ConfigSource::Disabled => LoadedConfig::empty(),
        };
        if let Some(path) = &loaded.path {
            let shown = path.strip_prefix(&self.cwd).unwrap_or(path.as_path());
            self.logger()
                .info(LABEL, format!("Using build-mate config: {}", shown.display()));
        }

        let mut targets = loaded.targets;
        if targets.is_empty() {
            targets.push(Options::default());
        }

        let results = join_all(
            targets
                .into_iter()
                .map(|target| self.run_target(target, overrides.clone())),
        )
        .await;

        let mut code = 0;
        for result in results {
            let target_code = result?;
            if code == 0 {
                code = target_code;
            }
        }
        Ok(code)
    }

    async fn run_target(&self, from_config: Options, overrides: Options) -> Result<i32> {
        let name = overrides.name.clone().or_else(|| from_config.name.clone());
        let logger = self.logger().named(name.as_deref());

        let options = normalize(from_config, overrides, &self.cwd, &logger)?;
        let watching = options.watch.is_enabled();
        let dts_only = options.dts_only();
        let config = BuildConfiguration::new(options);

        let engine = Arc::new(BuildEngine::new(self.backend(&self.cwd)?, logger.clone()));
        let controller = WatchController::new(engine, config.clone(), logger.clone());
        let declarations = DeclarationTask::new(Arc::clone(&self.transport));

        let main = async {
            if dts_only {
                Ok(())
            } else {
                controller.build_all().await
            }
        };
        let (dts_result, main_result) = tokio::join!(declarations.run(&config, &logger), main);

        if !watching {
            dts_result?;
            main_result?;
            return controller.finish().await;
        }

        for err in [dts_result.err(), main_result.err()].into_iter().flatten() {
            logger.error(LABEL, err);
        }
        if dts_only {
            // The worker watches its own sources.
            tokio::signal::ctrl_c().await?;
            return Ok(0);
        }
        controller.watch().await
    }

    fn backend(&self, cwd: &Path) -> Result<Arc<dyn Bundler>> {
        if let Some(backend) = &self.backend {
            return Ok(Arc::clone(backend));
        }
        default_backend(cwd)
    }
}

#[cfg(feature = "rolldown")]
fn default_backend(cwd: &Path) -> Result<Arc<dyn Bundler>> {
    Ok(Arc::new(buildmate_bundler::bundler::RolldownBundler::new(cwd)))
}

#[cfg(not(feature = "rolldown"))]
fn default_backend(cwd: &Path) -> Result<Arc<dyn Bundler>> {
    Ok(Arc::new(buildmate_bundler::EsbuildBundler::locate(cwd)?))
}

/// Run a build from parsed command-line arguments in the current directory.
pub async fn execute(args: BuildArgs, no_color: bool) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let color = !no_color && should_use_colors();
    tracing::debug!(cwd = %cwd.display(), color, "starting build");
    Orchestrator::new(cwd, color)
        .run(args.config_source(), args.to_overrides())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dts::{Status, WorkerReply, WorkerRequest};
    use crate::error::CliError;
    use crate::test_support::ScriptedBundler;
    use async_trait::async_trait;
    use buildmate_bundler::logger::MemorySink;
    use buildmate_config::EntryInput;
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<WorkerRequest>>,
    }

    #[async_trait]
    impl WorkerTransport for RecordingTransport {
        async fn spawn(&self, request: WorkerRequest) -> Result<mpsc::Receiver<WorkerReply>> {
            self.requests.lock().push(request);
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.send(WorkerReply::Status(Status::Success)).await;
            Ok(rx)
        }
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        dir
    }

    fn orchestrator(
        dir: &Path,
    ) -> (Orchestrator, Arc<MemorySink>, Arc<ScriptedBundler>, Arc<RecordingTransport>) {
        let sink = MemorySink::new();
        let bundler = Arc::new(ScriptedBundler::with_inputs(&["src/index.ts"]));
        let transport = Arc::new(RecordingTransport::default());
        let orchestrator = Orchestrator::new(dir, false)
            .with_sink(sink.clone())
            .with_backend(bundler.clone())
            .with_transport(transport.clone());
        (orchestrator, sink, bundler, transport)
    }

    fn entry() -> Options {
        Options {
            entry: Some(EntryInput::List(vec!["src/index.ts".into()])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn one_off_build_writes_output() {
        let dir = project();
        let (orchestrator, sink, bundler, transport) = orchestrator(dir.path());

        let code = orchestrator.run(ConfigSource::Disabled, entry()).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(bundler.calls(), 1);
        assert!(transport.requests.lock().is_empty());
        assert!(dir.path().join("dist/index.js").is_file());
        assert!(sink.contains("Building entry: src/index.ts"));
    }

    #[tokio::test]
    async fn every_config_target_runs_with_its_own_name() {
        let dir = project();
        std::fs::write(
            dir.path().join("build-mate.config.json"),
            r#"[
                {"name": "node", "entry": ["src/index.ts"], "outDir": "dist/node"},
                {"name": "web", "entry": ["src/index.ts"], "outDir": "dist/web"}
            ]"#,
        )
        .unwrap();
        let (orchestrator, sink, bundler, _) = orchestrator(dir.path());

        orchestrator
            .run(ConfigSource::Discover, Options::default())
            .await
            .unwrap();
        assert_eq!(bundler.calls(), 2);
        assert!(dir.path().join("dist/node/index.js").is_file());
        assert!(dir.path().join("dist/web/index.js").is_file());
        assert!(sink.contains("[NODE]"));
        assert!(sink.contains("[WEB]"));
        assert!(sink.contains("Using build-mate config"));
    }

    #[tokio::test]
    async fn dts_only_skips_the_main_build() {
        let dir = project();
        let (orchestrator, _, bundler, transport) = orchestrator(dir.path());
        let overrides = Options {
            dts: Some(buildmate_config::DtsInput::Config(buildmate_config::DtsOptions {
                only: Some(true),
                ..Default::default()
            })),
            ..entry()
        };

        orchestrator.run(ConfigSource::Disabled, overrides).await.unwrap();
        assert_eq!(bundler.calls(), 0);
        assert_eq!(transport.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn one_off_failure_is_an_error() {
        let dir = project();
        let (orchestrator, _, bundler, _) = orchestrator(dir.path());
        bundler.fail(true);

        let err = orchestrator.run(ConfigSource::Disabled, entry()).await.unwrap_err();
        assert!(matches!(err, CliError::Build(_)));
    }

    #[tokio::test]
    async fn missing_explicit_config_is_a_config_error() {
        let dir = project();
        let (orchestrator, _, _, _) = orchestrator(dir.path());
        let err = orchestrator
            .run(ConfigSource::Explicit("nope.json".into()), entry())
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
