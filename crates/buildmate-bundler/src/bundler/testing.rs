//! In-memory bundler for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BundleOutcome, BundleRequest, Bundler, TransformOutput, TransformRequest};
use crate::Result;

/// Returns canned outcomes and echoes transform input. Records requests.
#[derive(Default)]
pub struct StubBundler {
    pub outcome: Mutex<BundleOutcome>,
    pub requests: Mutex<Vec<BundleRequest>>,
    pub transforms: Mutex<Vec<TransformRequest>>,
}

#[async_trait]
impl Bundler for StubBundler {
    fn name(&self) -> &str {
        "stub"
    }

    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutcome> {
        self.requests.lock().push(request.clone());
        Ok(self.outcome.lock().clone())
    }

    async fn transform(&self, code: &str, request: &TransformRequest) -> Result<TransformOutput> {
        self.transforms.lock().push(request.clone());
        Ok(TransformOutput {
            code: format!("/* {} */\n{code}", request.sourcefile),
            map: None,
        })
    }
}
