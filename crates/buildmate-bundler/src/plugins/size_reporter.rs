use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::Result;
use crate::plugin::{Plugin, PluginContext, WrittenFile};
use crate::report::report_size;

/// Logs the size of each written file under the format's label.
///
/// The end hook sees every file written so far, so files already reported
/// in the current pass are skipped.
#[derive(Default)]
pub struct SizeReporter {
    reported: Mutex<FxHashSet<PathBuf>>,
}

#[async_trait]
impl Plugin for SizeReporter {
    fn name(&self) -> &str {
        "size-reporter"
    }

    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        self.reported.lock().clear();
        Ok(())
    }

    async fn build_end(&self, ctx: &PluginContext, files: &[WrittenFile]) -> Result<()> {
        let fresh: Vec<(String, u64)> = {
            let mut reported = self.reported.lock();
            files
                .iter()
                .filter(|file| reported.insert(file.path().to_path_buf()))
                .map(|file| (file.name(), file.size() as u64))
                .collect()
        };
        if !fresh.is_empty() {
            report_size(&ctx.logger, ctx.format.as_str(), &fresh);
        }
        Ok(())
    }
}
