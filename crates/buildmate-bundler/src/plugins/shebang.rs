use async_trait::async_trait;

use crate::Result;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

/// Marks JS chunks that start with `#!` as executable.
pub struct Shebang;

#[async_trait]
impl Plugin for Shebang {
    fn name(&self) -> &str {
        "shebang"
    }

    async fn render_chunk(
        &self,
        _ctx: &PluginContext,
        chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        if chunk.is_js() && chunk.code.starts_with("#!") {
            chunk.mode = Some(0o755);
        }
        Ok(None)
    }
}
