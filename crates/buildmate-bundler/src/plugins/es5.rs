use async_trait::async_trait;

use super::transform_request;
use crate::Result;
use crate::bundler::BundleRequest;
use crate::options::Minify;
use crate::plugin::{Chunk, Plugin, PluginContext, RenderedChunk};

const ES5: &str = "es5";
const BUNDLE_TARGET: &str = "es2020";

/// The bundler cannot emit es5 directly: bundle for es2020, then lower each
/// JS chunk.
pub struct Es5Target;

fn wants_es5(ctx: &PluginContext) -> bool {
    ctx.options.target.iter().any(|t| t.eq_ignore_ascii_case(ES5))
}

#[async_trait]
impl Plugin for Es5Target {
    fn name(&self) -> &str {
        "es5-target"
    }

    fn modify_bundle_options(&self, ctx: &PluginContext, request: &mut BundleRequest) -> Result<()> {
        if wants_es5(ctx) {
            for target in request.target.iter_mut() {
                if target.eq_ignore_ascii_case(ES5) {
                    *target = BUNDLE_TARGET.to_string();
                }
            }
        }
        Ok(())
    }

    async fn render_chunk(
        &self,
        ctx: &PluginContext,
        chunk: &mut Chunk,
    ) -> Result<Option<RenderedChunk>> {
        let lowerable = chunk
            .path
            .extension()
            .is_some_and(|ext| ext == "js" || ext == "cjs");
        if !wants_es5(ctx) || !lowerable {
            return Ok(None);
        }

        let mut request = transform_request(ctx, chunk);
        request.target = Some(ES5.to_string());
        request.minify = ctx.options.minify == Minify::Bundler;

        let output = ctx.bundler.transform(&chunk.code, &request).await?;
        Ok(Some(RenderedChunk {
            code: output.code,
            map: output.map,
        }))
    }
}
