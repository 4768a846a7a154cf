//! Declaration generation in a separate process.
//!
//! [`DeclarationTask`] hands a [`WorkerRequest`] to a [`WorkerTransport`] and
//! waits for the worker's status token, relaying its log records on the way.
//! [`ProcessTransport`] runs this same executable with the hidden
//! `__dts-worker` subcommand; the worker side lives in [`worker`].

pub mod protocol;
pub mod worker;

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use buildmate_bundler::logger::RecordKind;
use buildmate_bundler::{BuildConfiguration, LogRecord, Logger};
use buildmate_config::PackageJson;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{CliError, Result};
pub use protocol::{Status, WorkerReply, WorkerRequest};

/// Name of the hidden subcommand the worker runs under.
pub const WORKER_COMMAND: &str = "__dts-worker";

/// Starts a declaration worker and yields its replies.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn spawn(&self, request: WorkerRequest) -> Result<mpsc::Receiver<WorkerReply>>;
}

/// Runs the worker as a child process speaking JSON lines.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    color: bool,
}

impl ProcessTransport {
    /// `color` is passed on so the worker renders lines like the parent.
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

#[async_trait]
impl WorkerTransport for ProcessTransport {
    async fn spawn(&self, request: WorkerRequest) -> Result<mpsc::Receiver<WorkerReply>> {
        let exe = std::env::current_exe()?;
        let mut cmd = Command::new(exe);
        cmd.arg(WORKER_COMMAND)
            .current_dir(&request.options.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if self.color {
            cmd.env("FORCE_COLOR", "1").env_remove("NO_COLOR");
        } else {
            cmd.env("NO_COLOR", "1").env_remove("FORCE_COLOR");
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| CliError::Worker(format!("failed to start worker: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CliError::Worker("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::Worker("worker stdout unavailable".into()))?;

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            // A watching worker exits once its stdin closes.
            let _stdin = stdin;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read from declaration worker");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                // Stray output from the worker is passed through as a log line.
                let reply = WorkerReply::from_line(&line).unwrap_or(WorkerReply::Record(LogRecord {
                    kind: RecordKind::Log,
                    text: line,
                }));
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
            match child.wait().await {
                Ok(status) => tracing::debug!(%status, "declaration worker exited"),
                Err(err) => tracing::warn!(error = %err, "failed to wait for declaration worker"),
            }
        });

        Ok(rx)
    }
}

/// Generates declarations for one target through a worker.
#[derive(Clone)]
pub struct DeclarationTask {
    transport: Arc<dyn WorkerTransport>,
}

impl std::fmt::Debug for DeclarationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclarationTask").finish_non_exhaustive()
    }
}

impl DeclarationTask {
    pub fn new(transport: Arc<dyn WorkerTransport>) -> Self {
        Self { transport }
    }

    /// Resolve on the worker's first `"success"`, fail on `"error"` or when
    /// the worker goes away without a status. A no-op without `dts`.
    ///
    /// In watch mode the worker keeps running; its later messages are
    /// relayed to `logger` in the background.
    pub async fn run(&self, config: &BuildConfiguration, logger: &Logger) -> Result<()> {
        let options = &config.options;
        if !options.has_dts() {
            return Ok(());
        }

        let pkg = PackageJson::load_or_default(&options.cwd)?;
        let request = WorkerRequest {
            config_name: options.name.clone(),
            options: config.worker_options(pkg.package_type.as_deref()),
        };
        let mut replies = self.transport.spawn(request).await?;

        while let Some(reply) = replies.recv().await {
            let status = match reply {
                WorkerReply::Record(record) => {
                    logger.relay(&record);
                    continue;
                }
                WorkerReply::Status(status) => status,
            };

            if options.watch.is_enabled() {
                let logger = logger.clone();
                tokio::spawn(async move {
                    while let Some(reply) = replies.recv().await {
                        if let WorkerReply::Record(record) = reply {
                            logger.relay(&record);
                        }
                    }
                });
            }

            return match status {
                Status::Success => Ok(()),
                Status::Error => Err(CliError::Worker("see the DTS errors above".into())),
            };
        }

        Err(CliError::Worker(
            "the worker exited without reporting a result".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildmate_bundler::logger::MemorySink;
    use buildmate_bundler::options::Entry;
    use buildmate_bundler::{NormalizedOptions, normalize};
    use buildmate_config::{DtsInput, DtsOptions, DtsResolveInput, EntryInput, Options};
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records requests and answers with canned replies.
    struct ScriptedTransport {
        requests: Mutex<Vec<WorkerRequest>>,
        replies: Vec<WorkerReply>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<WorkerReply>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                replies,
            })
        }
    }

    #[async_trait]
    impl WorkerTransport for ScriptedTransport {
        async fn spawn(&self, request: WorkerRequest) -> Result<mpsc::Receiver<WorkerReply>> {
            self.requests.lock().push(request);
            let (tx, rx) = mpsc::channel(self.replies.len().max(1));
            for reply in &self.replies {
                let _ = tx.send(reply.clone()).await;
            }
            Ok(rx)
        }
    }

    fn record(text: &str) -> WorkerReply {
        WorkerReply::Record(LogRecord {
            kind: RecordKind::Log,
            text: text.into(),
        })
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn without_dts_the_worker_is_never_started() {
        let transport = ScriptedTransport::new(vec![]);
        let task = DeclarationTask::new(transport.clone());
        let options = NormalizedOptions::new("/p", Entry::List(vec!["src/index.ts".into()]));
        let logger = Logger::memory(MemorySink::new());

        task.run(&BuildConfiguration::new(options), &logger).await.unwrap();
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn worker_gets_named_entry_and_records_are_relayed() {
        let dir = project();
        let sink = MemorySink::new();
        let logger = Logger::memory(sink.clone());

        let user = Options {
            entry: Some(EntryInput::Map(IndexMap::from([(
                "main".to_string(),
                "src/index.ts".to_string(),
            )]))),
            dts: Some(DtsInput::Config(DtsOptions {
                resolve: Some(DtsResolveInput::All(true)),
                ..Default::default()
            })),
            ..Default::default()
        };
        let options = normalize(user, Options::default(), dir.path(), &logger).unwrap();

        let transport = ScriptedTransport::new(vec![
            record("[DTS] Build start"),
            WorkerReply::Status(Status::Success),
        ]);
        DeclarationTask::new(transport.clone())
            .run(&BuildConfiguration::new(options), &logger)
            .await
            .unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        let dts = requests[0].options.dts.as_ref().unwrap();
        assert_eq!(
            dts.entry,
            Some(Entry::Map(IndexMap::from([(
                "main".to_string(),
                "src/index.ts".to_string()
            )])))
        );
        assert!(sink.contains("[DTS] Build start"));
    }

    #[tokio::test]
    async fn error_status_fails_the_task() {
        let transport = ScriptedTransport::new(vec![WorkerReply::Status(Status::Error)]);
        let mut options = NormalizedOptions::new("/p", Entry::List(vec!["src/index.ts".into()]));
        options.dts = Some(Default::default());

        let err = DeclarationTask::new(transport)
            .run(&BuildConfiguration::new(options), &Logger::memory(MemorySink::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Worker(_)));
    }

    #[tokio::test]
    async fn worker_exiting_without_status_is_an_error() {
        let transport = ScriptedTransport::new(vec![record("partial")]);
        let mut options = NormalizedOptions::new("/p", Entry::List(vec!["src/index.ts".into()]));
        options.dts = Some(Default::default());

        let err = DeclarationTask::new(transport)
            .run(&BuildConfiguration::new(options), &Logger::memory(MemorySink::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without reporting"));
    }
}
