use async_trait::async_trait;

use super::transform_request;
use crate::Result;
use crate::options::Minify;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

const LABEL: &str = "MINIFY";

/// `minify: "terser"`: bundler minification is skipped and each JS chunk is
/// minified on its own instead. A chunk that fails to minify is written
/// unminified and the failure is logged.
pub struct AlternateMinifier;

#[async_trait]
impl Plugin for AlternateMinifier {
    fn name(&self) -> &str {
        "alternate-minifier"
    }

    async fn render_chunk(
        &self,
        ctx: &PluginContext,
        chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        if ctx.options.minify != Minify::Terser || !chunk.is_js() {
            return Ok(None);
        }

        let mut request = transform_request(ctx, chunk);
        request.minify = true;

        ctx.logger.info(LABEL, format!("Minifying {}", chunk.file_name()));
        match ctx.bundler.transform(&chunk.code, &request).await {
            Ok(output) => {
                ctx.logger.success(LABEL, format!("Minified {}", chunk.file_name()));
                Ok(Some(RenderedChunk {
                    code: output.code,
                    map: output.map,
                }))
            }
            Err(err) => {
                ctx.logger
                    .error(LABEL, format!("Failed to minify {}", chunk.file_name()));
                ctx.logger.error(LABEL, err);
                Ok(None)
            }
        }
    }
}
