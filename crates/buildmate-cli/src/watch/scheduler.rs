//! Debounced rebuild scheduling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

/// Quiet period after the last change before a rebuild starts.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Turns a stream of rebuild triggers into rebuilds.
///
/// Triggers are debounced on the trailing edge. Only one rebuild runs at a
/// time: triggers that arrive while it runs collapse into a single pending
/// rebuild, which is debounced again once the running one finishes.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    delay: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl Scheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run until `triggers` closes. A trigger already received when the
    /// channel closes still gets its rebuild.
    pub async fn run<F, Fut>(&self, mut triggers: mpsc::Receiver<()>, mut rebuild: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut open = true;
        while open {
            if triggers.recv().await.is_none() {
                return;
            }

            let mut pending = true;
            while pending {
                open = self.settle(&mut triggers).await;
                pending = false;

                let pass = rebuild();
                tokio::pin!(pass);
                loop {
                    tokio::select! {
                        () = &mut pass => break,
                        event = triggers.recv(), if open => match event {
                            Some(()) => pending = true,
                            None => open = false,
                        },
                    }
                }
            }
        }
    }

    /// Wait until `delay` passes without a trigger. `false` once the channel
    /// has closed.
    async fn settle(&self, triggers: &mut mpsc::Receiver<()>) -> bool {
        loop {
            match tokio::time::timeout(self.delay, triggers.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return false,
                Err(_) => return true,
            }
        }
    }
}
