//! File system watcher feeding the rebuild loop.

use std::fmt;
use std::path::{Path, PathBuf};

use buildmate_bundler::NormalizedOptions;
use buildmate_bundler::glob::GlobSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

/// Always excluded from watching. `.build-mate-*` holds bundler staging
/// output and source overlays.
const ALWAYS_IGNORED: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/.build-mate-*",
    "**/.build-mate-*/**",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Paths the watcher drops before they reach the rebuild loop.
pub struct IgnoreSet {
    patterns: Vec<String>,
    globs: GlobSet,
}

impl fmt::Debug for IgnoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreSet")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl IgnoreSet {
    /// VCS and dependency directories, the output directory and the
    /// user's `ignoreWatch` entries.
    pub fn for_options(options: &NormalizedOptions) -> Result<Self> {
        Self::new(
            &options.cwd,
            std::iter::once(options.out_dir.as_str())
                .chain(options.ignore_watch.iter().map(String::as_str)),
        )
    }

    /// The always-ignored directories plus `dirs`, relative to `cwd`.
    pub fn new<'a>(cwd: &Path, dirs: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut patterns: Vec<String> = ALWAYS_IGNORED.iter().map(|p| p.to_string()).collect();
        for dir in dirs {
            let dir = dir.trim_start_matches("./").trim_end_matches('/');
            if dir.is_empty() {
                continue;
            }
            patterns.push(dir.to_string());
            patterns.push(format!("{dir}/**"));
        }
        let globs = GlobSet::new(cwd, &patterns)?;
        Ok(Self { patterns, globs })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.globs.is_match(path)
    }
}

/// A running watcher. Dropping it stops the events.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively. Events for ignored paths are dropped;
    /// the rest are sent on the returned channel.
    pub fn new(paths: &[PathBuf], ignore: IgnoreSet) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watch error");
                    return;
                }
            };
            let kind = match event.kind {
                EventKind::Create(_) => ChangeKind::Add,
                EventKind::Modify(_) => ChangeKind::Change,
                EventKind::Remove(_) => ChangeKind::Unlink,
                _ => return,
            };
            for path in event.paths {
                if ignore.is_ignored(&path) {
                    continue;
                }
                // Fails only once the receiver is gone.
                if tx.blocking_send(FileChange { kind, path }).is_err() {
                    return;
                }
            }
        })?;

        for path in paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildmate_bundler::options::Entry;

    fn options(cwd: &Path) -> NormalizedOptions {
        let mut options = NormalizedOptions::new(cwd, Entry::List(vec!["src/index.ts".into()]));
        options.ignore_watch = vec!["./fixtures/".into()];
        options
    }

    #[test]
    fn ignores_vcs_dependencies_output_and_user_paths() {
        let cwd = Path::new("/project");
        let ignore = IgnoreSet::for_options(&options(cwd)).unwrap();

        assert!(ignore.is_ignored(&cwd.join("node_modules/react/index.js")));
        assert!(ignore.is_ignored(&cwd.join("packages/a/node_modules/x.js")));
        assert!(ignore.is_ignored(&cwd.join(".git/HEAD")));
        assert!(ignore.is_ignored(&cwd.join("dist/index.js")));
        assert!(ignore.is_ignored(&cwd.join("fixtures/a.ts")));
        assert!(ignore.is_ignored(&cwd.join(".build-mate-src-x1y2/src/index.ts")));
        assert!(ignore.is_ignored(&cwd.join(".build-mate-a1b2")));
        assert!(!ignore.is_ignored(&cwd.join("src/index.ts")));
        assert!(!ignore.is_ignored(&cwd.join("package.json")));
    }

    #[test]
    fn change_kinds_render_like_the_log_line() {
        assert_eq!(ChangeKind::Add.to_string(), "add");
        assert_eq!(ChangeKind::Unlink.to_string(), "unlink");
    }
}
