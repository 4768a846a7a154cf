//! Injected shim files.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::Result;

const CJS_SHIMS: &str = include_str!("../../assets/cjs_shims.js");
const ESM_SHIMS: &str = include_str!("../../assets/esm_shims.js");

/// Shim sources written to a temporary directory on first use. The
/// directory lives as long as the engine.
#[derive(Debug, Default)]
pub struct ShimFiles {
    materialized: Mutex<Option<Arc<TempDir>>>,
}

impl ShimFiles {
    fn dir(&self) -> Result<Arc<TempDir>> {
        let mut slot = self.materialized.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let dir = tempfile::Builder::new().prefix("build-mate-shims").tempdir()?;
        std::fs::write(dir.path().join("cjs_shims.js"), CJS_SHIMS)?;
        std::fs::write(dir.path().join("esm_shims.js"), ESM_SHIMS)?;
        tracing::debug!(dir = %dir.path().display(), "materialized shim files");

        let dir = Arc::new(dir);
        *slot = Some(Arc::clone(&dir));
        Ok(dir)
    }

    /// Defines `importMetaUrl` for cjs output.
    pub fn cjs(&self) -> Result<PathBuf> {
        Ok(self.dir()?.path().join("cjs_shims.js"))
    }

    /// Defines `__dirname` and `__filename` for esm output on node.
    pub fn esm(&self) -> Result<PathBuf> {
        Ok(self.dir()?.path().join("esm_shims.js"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shims_are_written_once() {
        let shims = ShimFiles::default();
        let cjs = shims.cjs().unwrap();
        let esm = shims.esm().unwrap();
        assert_eq!(cjs.parent(), esm.parent());
        assert!(std::fs::read_to_string(&cjs).unwrap().contains("importMetaUrl"));
        assert!(std::fs::read_to_string(&esm).unwrap().contains("__dirname"));
        assert_eq!(shims.cjs().unwrap(), cjs);
    }
}
