//! The build-and-rebuild loop for one target.
//!
//! [`WatchController::build_all`] is one full pass: tear down the previous
//! on-success side effect, start a fresh dependency set, clean, build every
//! format and start the on-success action. [`WatchController::watch`] wires a
//! [`FileWatcher`] to a debounced [`Scheduler`] that calls it again.

pub mod on_success;
pub mod scheduler;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use buildmate_bundler::config::Cleanup;
use buildmate_bundler::engine::clean_output;
use buildmate_bundler::options::WatchMode;
use buildmate_bundler::{BuildConfiguration, BuildEngine, DependencyTracker, Logger, OnSuccess};
use buildmate_config::PackageJson;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
pub use on_success::RunningCommand;
pub use scheduler::{DEBOUNCE, Scheduler};
pub use watcher::{ChangeKind, FileChange, FileWatcher, IgnoreSet};

const LABEL: &str = "CLI";

/// The live side effect of the last successful pass.
enum SuccessState {
    Command(RunningCommand),
    Cleanup(Cleanup),
}

pub struct WatchController {
    engine: Arc<BuildEngine>,
    config: BuildConfiguration,
    logger: Logger,
    deps: DependencyTracker,
    manifest_hash: Mutex<Option<String>>,
    on_success: Mutex<Option<SuccessState>>,
    exit_code: Arc<AtomicI32>,
}

impl std::fmt::Debug for WatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchController")
            .field("config", &self.config)
            .field("deps", &self.deps.len())
            .field("exit_code", &self.exit_code())
            .finish_non_exhaustive()
    }
}

impl WatchController {
    pub fn new(engine: Arc<BuildEngine>, config: BuildConfiguration, logger: Logger) -> Self {
        let manifest_hash = manifest_hash(&config.options.cwd);
        Self {
            engine,
            config,
            logger,
            deps: DependencyTracker::new(),
            manifest_hash: Mutex::new(manifest_hash),
            on_success: Mutex::new(None),
            exit_code: Arc::new(AtomicI32::new(0)),
        }
    }

    pub fn dependencies(&self) -> &DependencyTracker {
        &self.deps
    }

    /// Nonzero exit status of the last on-success command, or 0.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// One complete build pass over every format.
    pub async fn build_all(&self) -> Result<()> {
        self.teardown().await?;

        self.deps.begin_pass();
        let options = &self.config.options;
        let removed = clean_output(options)?;
        if removed > 0 {
            tracing::debug!(removed, "cleaned output directory");
        }

        self.engine.build_formats(&self.config, &self.deps).await?;

        match &self.config.on_success {
            Some(OnSuccess::Command(command)) => {
                let running =
                    RunningCommand::spawn(command, &options.cwd, Arc::clone(&self.exit_code))?;
                *self.on_success.lock() = Some(SuccessState::Command(running));
            }
            Some(OnSuccess::Callback(callback)) => {
                if let Some(cleanup) = callback().await? {
                    *self.on_success.lock() = Some(SuccessState::Cleanup(cleanup));
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Stop the previous pass's on-success command, or run its cleanup.
    pub async fn teardown(&self) -> Result<()> {
        let previous = self.on_success.lock().take();
        match previous {
            Some(SuccessState::Command(running)) => {
                running.terminate(self.config.options.kill_signal).await
            }
            Some(SuccessState::Cleanup(cleanup)) => Ok(cleanup().await?),
            None => Ok(()),
        }
    }

    /// After a one-off build: let the on-success command run to completion
    /// and return its exit status.
    pub async fn finish(&self) -> Result<i32> {
        let previous = self.on_success.lock().take();
        if let Some(SuccessState::Command(running)) = previous {
            running.wait().await?;
        }
        Ok(self.exit_code())
    }

    /// Whether a change to `path` should start a rebuild.
    ///
    /// With explicit watch paths every change counts. Watching everything,
    /// only files the last successful build read count, and `package.json`
    /// counts only when its dependency fields changed.
    pub fn should_rebuild(&self, path: &Path) -> bool {
        if matches!(self.config.options.watch, WatchMode::Paths(_)) {
            return true;
        }

        let cwd = &self.config.options.cwd;
        if path == cwd.join("package.json") {
            let current = manifest_hash(cwd);
            let mut previous = self.manifest_hash.lock();
            if *previous == current {
                return false;
            }
            *previous = current;
            return true;
        }
        self.deps.contains(path)
    }

    /// Paths handed to the file watcher.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let options = &self.config.options;
        match &options.watch {
            WatchMode::Paths(paths) => paths.iter().map(|p| options.cwd.join(p)).collect(),
            _ => vec![options.cwd.clone()],
        }
    }

    /// Rebuild on change until Ctrl+C, then tear down the on-success action.
    /// Returns the exit status to report.
    pub async fn watch(&self) -> Result<i32> {
        let options = &self.config.options;
        let ignore = IgnoreSet::for_options(options)?;
        let paths = self.watch_paths();

        self.logger.info(
            LABEL,
            format!(
                "Watching for changes in {}",
                paths
                    .iter()
                    .map(|p| format!("\"{}\"", display_relative(p, &options.cwd)))
                    .collect::<Vec<_>>()
                    .join(" | ")
            ),
        );
        self.logger.info(
            LABEL,
            format!(
                "Ignoring changes in {}",
                ignore
                    .patterns()
                    .iter()
                    .map(|p| format!("\"{p}\""))
                    .collect::<Vec<_>>()
                    .join(" | ")
            ),
        );

        let (watcher, events) = FileWatcher::new(&paths, ignore)?;
        let (triggers_tx, triggers_rx) = mpsc::channel(16);

        let scheduler = Scheduler::default();
        let forward = self.forward(events, triggers_tx);
        let rebuilds = scheduler.run(triggers_rx, || self.rebuild());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("received Ctrl+C, stopping watcher");
            }
            _ = futures::future::join(forward, rebuilds) => {}
        }

        drop(watcher);
        self.teardown().await?;
        Ok(self.exit_code())
    }

    async fn forward(&self, mut events: mpsc::Receiver<FileChange>, triggers: mpsc::Sender<()>) {
        let cwd = &self.config.options.cwd;
        while let Some(change) = events.recv().await {
            if !self.should_rebuild(&change.path) {
                continue;
            }
            self.logger.info(
                LABEL,
                format!(
                    "Change detected: {} {}",
                    change.kind,
                    display_relative(&change.path, cwd)
                ),
            );
            // A full channel already guarantees a rebuild.
            let _ = triggers.try_send(());
        }
    }

    /// Rebuild errors are reported and watching goes on.
    async fn rebuild(&self) {
        if let Err(err) = self.build_all().await {
            self.logger.error(LABEL, err);
        }
    }
}

fn manifest_hash(cwd: &Path) -> Option<String> {
    let path = cwd.join("package.json");
    if !path.is_file() {
        return None;
    }
    PackageJson::from_path(&path)
        .ok()
        .map(|pkg| pkg.dependency_hash())
}

fn display_relative(path: &Path, cwd: &Path) -> String {
    let rel = path.strip_prefix(cwd).unwrap_or(path);
    if rel.as_os_str().is_empty() {
        ".".to_string()
    } else {
        buildmate_bundler::glob::slash(&rel.to_string_lossy())
    }
}
