//! Secure file writing for build output.
//!
//! Every path is validated against the output directory before anything
//! touches the disk, and each file is written to a sibling temp file first and
//! then renamed into place, so readers never see a half-written chunk.

use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::glob::{self, GlobSet};
use crate::{Error, Result};

/// Normalize `dir` to an absolute, clean path.
fn validate_and_normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }
    let cwd = std::env::current_dir().map_err(|e| {
        Error::InvalidOutputPath(format!("Failed to get current directory: {e}"))
    })?;
    Ok(cwd.join(cleaned).clean())
}

/// Resolve `path` (absolute, or relative to `base_dir`) and make sure it stays
/// inside `base_dir`.
pub fn validate_output_path(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    if path.to_string_lossy().contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let upper = stem.to_uppercase();
            let device_names = [
                "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6",
                "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7",
                "LPT8", "LPT9",
            ];
            if device_names.contains(&upper.as_str()) {
                return Err(Error::InvalidOutputPath(format!(
                    "Filename is a reserved device name: {}",
                    path.display()
                )));
            }
        }
    }

    let base_dir = validate_and_normalize_dir(base_dir)?;
    let full_path = base_dir.join(path).clean();

    if !full_path.starts_with(&base_dir) {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            path.display(),
            base_dir.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}

/// Write `contents` to `path` atomically, creating parent directories.
///
/// `mode` is applied before the rename on unix and ignored elsewhere.
pub async fn write_file(
    base_dir: &Path,
    path: &Path,
    contents: &[u8],
    mode: Option<u32>,
) -> Result<PathBuf> {
    let target = validate_output_path(base_dir, path)?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Error::WriteFailure(format!(
                "Failed to create directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let temp = temp_path(&target);
    if let Err(e) = tokio::fs::write(&temp, contents).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::WriteFailure(format!(
            "Failed to write '{}': {e}",
            target.display()
        )));
    }

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(mode)).await
        {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(Error::WriteFailure(format!(
                "Failed to set mode on '{}': {e}",
                target.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    if let Err(e) = tokio::fs::rename(&temp, &target).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::WriteFailure(format!(
            "Failed to move '{}' into place: {e}",
            target.display()
        )));
    }

    tracing::trace!(path = %target.display(), bytes = contents.len(), "wrote output file");
    Ok(target)
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    target.with_file_name(name)
}

/// Delete files under `dir` matching `patterns` (relative globs, `!` negates).
/// An empty pattern list removes everything. Returns the number of files
/// removed; a missing directory removes nothing.
pub fn remove_matching(dir: &Path, patterns: &[String]) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let everything = ["**/*".to_string()];
    let patterns = if patterns.is_empty() {
        &everything[..]
    } else {
        patterns
    };
    let set = GlobSet::new(dir, patterns)?;

    let mut removed = 0;
    for file in glob::walk_files(dir) {
        if !set.is_match(&file) {
            continue;
        }
        std::fs::remove_file(&file)?;
        removed += 1;
    }
    tracing::debug!(dir = %dir.display(), removed, "cleaned output directory");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let err = validate_output_path(dir.path(), Path::new("../../etc/passwd")).unwrap_err();
        assert!(matches!(err, Error::InvalidOutputPath(_)));

        let err = validate_output_path(dir.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, Error::InvalidOutputPath(_)));
    }

    #[test]
    fn accepts_nested_and_absolute_inside() {
        let dir = TempDir::new().unwrap();
        let nested = validate_output_path(dir.path(), Path::new("chunks/./a.js")).unwrap();
        assert_eq!(nested, dir.path().join("chunks/a.js"));

        let inside = dir.path().join("b.js");
        assert_eq!(validate_output_path(dir.path(), &inside).unwrap(), inside);
    }

    #[tokio::test]
    async fn writes_atomically_with_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), Path::new("bin/cli.js"), b"#!/usr/bin/env node\n", Some(0o755))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#!/usr/bin/env node\n");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("bin"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn removes_matching_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("types")).unwrap();
        std::fs::write(dir.path().join("index.js"), "").unwrap();
        std::fs::write(dir.path().join("types/index.d.ts"), "").unwrap();

        let removed = remove_matching(dir.path(), &["**/*.d.ts".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("index.js").exists());
        assert!(!dir.path().join("types/index.d.ts").exists());

        assert_eq!(remove_matching(dir.path(), &[]).unwrap(), 1);
        assert!(!dir.path().join("index.js").exists());
    }
}
