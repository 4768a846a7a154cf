//! Lifecycle of the on-success command.
//!
//! The command runs through the platform shell. On unix it gets its own
//! process group, so terminating it signals everything it started.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use buildmate_bundler::options::KillSignal;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{CliError, Result};

/// A spawned on-success command.
#[derive(Debug)]
pub struct RunningCommand {
    pid: Option<u32>,
    waiter: JoinHandle<()>,
}

impl RunningCommand {
    /// Start `command` in `cwd`. A nonzero exit status is stored in
    /// `exit_code` when the command exits on its own.
    pub fn spawn(command: &str, cwd: &Path, exit_code: Arc<AtomicI32>) -> Result<Self> {
        let mut cmd = shell(command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| CliError::Process(format!("failed to start `{command}`: {e}")))?;
        let pid = child.id();
        tracing::debug!(?pid, command, "started onSuccess command");

        let waiter = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    if let Some(code) = status.code() {
                        if code != 0 {
                            exit_code.store(code, Ordering::SeqCst);
                        }
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to wait for onSuccess command"),
            }
        });

        Ok(Self { pid, waiter })
    }

    pub fn is_finished(&self) -> bool {
        self.waiter.is_finished()
    }

    /// Wait for the command to exit by itself.
    pub async fn wait(self) -> Result<()> {
        self.waiter
            .await
            .map_err(|e| CliError::Process(format!("onSuccess waiter failed: {e}")))
    }

    /// Signal the whole process tree and wait for the command to exit.
    pub async fn terminate(self, signal: KillSignal) -> Result<()> {
        if !self.waiter.is_finished() {
            if let Some(pid) = self.pid {
                kill_tree(pid, signal).await?;
            }
        }
        self.wait().await
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
async fn kill_tree(pid: u32, signal: KillSignal) -> Result<()> {
    let signal = match signal {
        KillSignal::Term => libc::SIGTERM,
        KillSignal::Kill => libc::SIGKILL,
    };
    let group = -(pid as libc::pid_t);
    // SAFETY: kill(2) with a negative pid signals the process group the
    // command was started in; it touches no memory.
    let rc = unsafe { libc::kill(group, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone.
        return Ok(());
    }
    Err(CliError::Process(format!("failed to signal process group {pid}: {err}")))
}

#[cfg(windows)]
async fn kill_tree(pid: u32, _signal: KillSignal) -> Result<()> {
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| CliError::Process(format!("failed to run taskkill: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::Process(format!("taskkill failed for process {pid}")))
    }
}
