//! Glob matching over project files.
//!
//! Patterns use gitignore-style glob syntax (`*`, `**`, `?`, `[..]`) via the
//! `ignore` crate's override matcher. A leading `!` excludes.

use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use walkdir::WalkDir;

use crate::{Error, Result};

/// Directories never descended into when expanding globs.
const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

pub struct GlobSet {
    matcher: Override,
}

impl GlobSet {
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add(trim_dot_slash(pattern))
                .map_err(|e| Error::Config(format!("invalid glob `{pattern}`: {e}")))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| Error::Config(format!("invalid glob set: {e}")))?;
        Ok(Self { matcher })
    }

    pub fn is_match(&self, path: &Path) -> bool {
        self.matcher.matched(path, path.is_dir()).is_whitelist()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }
}

fn trim_dot_slash(pattern: &str) -> &str {
    pattern.strip_prefix("./").unwrap_or(pattern)
}

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{', '!'])
}

/// All files under `root`, skipping dependency and VCS directories.
pub fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name)))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
}

/// Expand entry patterns relative to `root`.
///
/// Literal paths keep their position; glob matches are appended in sorted
/// order. `!pattern` removes matches from the result.
pub fn expand<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Vec<String>> {
    let (negative, positive): (Vec<&str>, Vec<&str>) = patterns
        .iter()
        .map(AsRef::as_ref)
        .partition(|p| p.starts_with('!'));

    let exclude = if negative.is_empty() {
        None
    } else {
        let stripped: Vec<&str> = negative.iter().map(|p| &p[1..]).collect();
        Some(GlobSet::new(root, &stripped)?)
    };

    let mut files: Option<Vec<PathBuf>> = None;
    let mut out: Vec<String> = Vec::new();
    let mut push = |rel: String| {
        if !out.contains(&rel) {
            out.push(rel);
        }
    };

    for pattern in positive {
        if !is_glob(pattern) {
            if root.join(pattern).is_file() {
                push(slash(trim_dot_slash(pattern)));
            }
            continue;
        }

        let set = GlobSet::new(root, &[pattern])?;
        let all = files.get_or_insert_with(|| {
            let mut found: Vec<PathBuf> = walk_files(root).collect();
            found.sort();
            found
        });
        for file in all.iter() {
            if !set.is_match(file) {
                continue;
            }
            if let Ok(rel) = file.strip_prefix(root) {
                push(slash(&rel.to_string_lossy()));
            }
        }
    }

    if let Some(exclude) = exclude {
        out.retain(|rel| !exclude.is_match(&root.join(rel)));
    }
    Ok(out)
}

/// Replace backslashes with forward slashes, except in extended-length
/// (`\\?\`) paths and paths containing non-ASCII characters.
pub fn slash(path: &str) -> String {
    if path.starts_with(r"\\?\") || !path.is_ascii() {
        return path.to_string();
    }
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        for file in ["src/a.ts", "src/b.ts", "src/nested/c.ts", "src/a.test.ts", "node_modules/pkg/x.ts"] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        dir
    }

    #[test]
    fn expands_globs_and_skips_node_modules() {
        let dir = project();
        let files = expand(dir.path(), &["**/*.ts"]).unwrap();
        assert_eq!(files, vec!["src/a.test.ts", "src/a.ts", "src/b.ts", "src/nested/c.ts"]);
    }

    #[test]
    fn negation_excludes_matches() {
        let dir = project();
        let files = expand(dir.path(), &["src/*.ts", "!**/*.test.ts"]).unwrap();
        assert_eq!(files, vec!["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn literal_paths_keep_order() {
        let dir = project();
        let files = expand(dir.path(), &["./src/b.ts", "src/a.ts", "src/missing.ts"]).unwrap();
        assert_eq!(files, vec!["src/b.ts", "src/a.ts"]);
    }

    #[test]
    fn slash_rules() {
        assert_eq!(slash(r"src\index.ts"), "src/index.ts");
        assert_eq!(slash(r"\\?\C:\src\index.ts"), r"\\?\C:\src\index.ts");
        assert_eq!(slash(r"src\ñ.ts"), r"src\ñ.ts");
    }
}
