use async_trait::async_trait;

use super::transform_request;
use crate::Result;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

/// Re-bundles each JS chunk with tree shaking, emitting the pass's real
/// format. When `treeshake` is on the bundler always produces esm, so this is
/// also where the chunk is brought back to the requested format.
pub struct TreeShaking;

#[async_trait]
impl Plugin for TreeShaking {
    fn name(&self) -> &str {
        "tree-shaking"
    }

    async fn render_chunk(
        &self,
        ctx: &PluginContext,
        chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        if !ctx.options.treeshake || !chunk.is_js() {
            return Ok(None);
        }

        let mut request = transform_request(ctx, chunk);
        request.format = Some(ctx.format);
        request.tree_shaking = true;

        let output = ctx.bundler.transform(&chunk.code, &request).await?;
        Ok(Some(RenderedChunk {
            code: output.code,
            map: output.map,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Format;
    use crate::plugins::test_support::context;

    #[tokio::test]
    async fn converts_to_pass_format() {
        let (ctx, bundler, _) = context(Format::Iife, |o| o.treeshake = true);
        let mut chunk = Chunk::new("/project/dist/index.global.js", "export const a = 1");
        let rendered = TreeShaking.render_chunk(&ctx, &mut chunk).await.unwrap().unwrap();

        assert!(rendered.code.ends_with("export const a = 1"));
        let requests = bundler.transforms.lock();
        assert_eq!(requests[0].format, Some(Format::Iife));
        assert!(requests[0].tree_shaking);
    }

    #[tokio::test]
    async fn off_by_default() {
        let (ctx, bundler, _) = context(Format::Cjs, |_| {});
        let mut chunk = Chunk::new("/project/dist/index.js", "x");
        assert!(TreeShaking.render_chunk(&ctx, &mut chunk).await.unwrap().is_none());
        assert!(bundler.transforms.lock().is_empty());
    }
}
