//! The `__dts-worker` process.
//!
//! Reads one [`WorkerRequest`] line from stdin, generates declarations and
//! writes status tokens and log records to stdout. In watch mode it stays up,
//! regenerating when a declaration source changes, until its stdin closes.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildmate_bundler::dts::{self, LABEL};
use buildmate_bundler::logger::RelaySink;
use buildmate_bundler::options::WatchMode;
use buildmate_bundler::{LogSettings, Logger, WorkerOptions};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::protocol::{Status, WorkerReply, WorkerRequest};
use crate::error::{CliError, Result};
use crate::logger::should_use_colors;
use crate::watch::{FileWatcher, IgnoreSet, Scheduler};

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

/// Run the worker. `Ok(false)` means the failure was already reported to
/// the parent and the process should exit nonzero.
pub async fn run() -> Result<bool> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let line = stdin
        .next_line()
        .await?
        .ok_or_else(|| CliError::Worker("no request on stdin".into()))?;
    let request: WorkerRequest = serde_json::from_str(&line)?;
    let options = request.options;

    let settings = LogSettings::new(should_use_colors());
    settings.set_silent(options.silent);
    let logger = Logger::new(settings, Arc::new(RelaySink)).named(request.config_name.as_deref());

    if !dts::typescript_available(&options.cwd) {
        logger.error(LABEL, CliError::TypescriptMissing);
        post(Status::Error);
        return Ok(false);
    }

    let generator = Generator {
        options,
        logger,
        sources: Mutex::new(HashSet::new()),
    };
    let ok = generator.generate().await;

    if !generator.options.watch.is_enabled() {
        return Ok(ok);
    }

    tokio::select! {
        result = generator.watch() => result?,
        // The parent holds our stdin open for as long as it wants us.
        _ = async { while let Ok(Some(_)) = stdin.next_line().await {} } => {
            tracing::debug!("parent closed the worker channel");
        }
    }
    Ok(true)
}

struct Generator {
    options: WorkerOptions,
    logger: Logger,
    sources: Mutex<HashSet<PathBuf>>,
}

impl Generator {
    /// One declaration pass; posts its status.
    async fn generate(&self) -> bool {
        match dts::build(&self.options, &self.logger).await {
            Ok(build) => {
                *self.sources.lock() = build.sources.into_iter().collect();
                post(Status::Success);
                true
            }
            Err(err) => {
                self.logger.error(LABEL, err);
                post(Status::Error);
                false
            }
        }
    }

    fn is_trigger(&self, path: &Path) -> bool {
        if self.sources.lock().contains(path) {
            return true;
        }
        // New files can only join the graph through explicit watch paths.
        matches!(self.options.watch, WatchMode::Paths(_)) && is_declaration_source(path)
    }

    async fn watch(&self) -> Result<()> {
        let options = &self.options;
        let out_dir = options
            .out_dir
            .strip_prefix(&options.cwd)
            .unwrap_or(options.out_dir.as_path());
        let out_dir = out_dir.to_string_lossy();
        let ignore = IgnoreSet::new(
            &options.cwd,
            std::iter::once(&*out_dir).chain(options.ignore_watch.iter().map(String::as_str)),
        )?;
        let paths: Vec<PathBuf> = match &options.watch {
            WatchMode::Paths(paths) => paths.iter().map(|p| options.cwd.join(p)).collect(),
            _ => vec![options.cwd.clone()],
        };

        let (_watcher, mut events) = FileWatcher::new(&paths, ignore)?;
        let (tx, rx) = mpsc::channel(16);
        let forward = async move {
            while let Some(change) = events.recv().await {
                if self.is_trigger(&change.path) {
                    let _ = tx.try_send(());
                }
            }
        };

        let scheduler = Scheduler::default();
        futures::future::join(forward, scheduler.run(rx, || self.regenerate())).await;
        Ok(())
    }

    async fn regenerate(&self) {
        self.generate().await;
    }
}

fn is_declaration_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Write a status token the same way [`RelaySink`] writes records.
fn post(status: Status) {
    if let Ok(line) = WorkerReply::Status(status).to_line() {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}
