use async_trait::async_trait;

use super::transform_request;
use crate::Result;
use crate::options::Format;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

/// Code splitting only exists for esm, so split cjs builds are bundled as
/// esm and each chunk is converted to CommonJS here.
pub struct CjsSplitting;

#[async_trait]
impl Plugin for CjsSplitting {
    fn name(&self) -> &str {
        "cjs-splitting"
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
        if !ctx.splitting || ctx.options.treeshake || ctx.format != Format::Cjs || !is_cjs_file {
            return Ok(None);
        }

        let mut request = transform_request(ctx, chunk);
        request.format = Some(Format::Cjs);

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
    use crate::plugins::test_support::context;

    #[tokio::test]
    async fn only_for_split_cjs_without_treeshake() {
        let (ctx, bundler, _) = context(Format::Cjs, |o| o.splitting = Some(true));
        let mut chunk = Chunk::new("/project/dist/chunk-abc.js", "export {}");
        assert!(CjsSplitting.render_chunk(&ctx, &mut chunk).await.unwrap().is_some());
        assert_eq!(bundler.transforms.lock()[0].format, Some(Format::Cjs));

        let (ctx, _, _) = context(Format::Cjs, |o| {
            o.splitting = Some(true);
            o.treeshake = true;
        });
        assert!(CjsSplitting.render_chunk(&ctx, &mut chunk).await.unwrap().is_none());

        let (ctx, _, _) = context(Format::Esm, |o| o.splitting = Some(true));
        let mut esm = Chunk::new("/project/dist/chunk-abc.mjs", "export {}");
        assert!(CjsSplitting.render_chunk(&ctx, &mut esm).await.unwrap().is_none());
    }
}
