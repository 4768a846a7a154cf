use async_trait::async_trait;

use crate::Result;
use crate::options::Format;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

/// Lets `require()` callers get a cjs entry's default export directly.
pub struct CjsInterop;

#[async_trait]
impl Plugin for CjsInterop {
    fn name(&self) -> &str {
        "cjs-interop"
    }

    async fn render_chunk(
        &self,
        ctx: &PluginContext,
        chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        let is_cjs_file = chunk
            .path
            .extension()
            .is_some_and(|ext| ext == "js" || ext == "cjs");
        if !ctx.options.cjs_interop
            || ctx.format != Format::Cjs
            || !is_cjs_file
            || !chunk.is_entry()
            || chunk.exports != ["default"]
        {
            return Ok(None);
        }

        // Appending leaves existing positions intact, so no new map.
        Ok(Some(RenderedChunk::code(format!(
            "{}\nmodule.exports = exports.default",
            chunk.code
        ))))
    }
}
