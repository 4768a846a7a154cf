//! The set of input files the last successful build read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

#[derive(Debug, Default)]
struct State {
    current: FxHashSet<PathBuf>,
    previous: FxHashSet<PathBuf>,
}

/// Accumulates input paths during a pass and rolls back to the pre-pass
/// snapshot when the pass fails. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    state: Arc<Mutex<State>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current set and clear it for a new pass.
    pub fn begin_pass(&self) {
        let mut state = self.state.lock();
        state.previous = std::mem::take(&mut state.current);
    }

    /// Record inputs reported by the bundler. Relative paths are resolved
    /// against `cwd`.
    pub fn record<I, P>(&self, cwd: &Path, inputs: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut state = self.state.lock();
        for input in inputs {
            state.current.insert(cwd.join(input));
        }
    }

    /// Restore exactly the pre-pass snapshot.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        state.current = state.previous.clone();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().current.contains(path)
    }

    pub fn len(&self) -> usize {
        self.state.lock().current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> FxHashSet<PathBuf> {
        self.state.lock().current.clone()
    }
}
