//! Built-in transform plugins.
//!
//! They run before user plugins, in the order [`builtin_plugins`] returns
//! them. Later plugins read what earlier ones produced, so the order matters:
//! splitting fix-ups come before minification, interop fix-ups before the
//! size report.

mod cjs_interop;
mod cjs_splitting;
mod es5;
mod shebang;
mod size_reporter;
mod terser;
mod tree_shaking;

pub use cjs_interop::CjsInterop;
pub use cjs_splitting::CjsSplitting;
pub use es5::Es5Target;
pub use shebang::Shebang;
pub use size_reporter::SizeReporter;
pub use terser::AlternateMinifier;
pub use tree_shaking::TreeShaking;

use std::sync::Arc;

use crate::bundler::TransformRequest;
use crate::plugin::{Chunk, Plugin, PluginContext};

/// Fresh instances of the built-in plugins, in transform order.
pub fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(Shebang),
        Arc::new(TreeShaking),
        Arc::new(CjsSplitting),
        Arc::new(Es5Target),
        Arc::new(AlternateMinifier),
        Arc::new(SizeReporter::default()),
        Arc::new(CjsInterop),
    ]
}

/// Transform settings every built-in starts from.
fn transform_request(ctx: &PluginContext, chunk: &Chunk) -> TransformRequest {
    TransformRequest {
        sourcefile: chunk.path.to_string_lossy().into_owned(),
        sourcemap: ctx.options.sourcemap.enabled(),
        keep_names: ctx.options.keep_names,
        global_name: ctx.options.global_name.clone(),
        platform: Some(ctx.options.platform),
        ..TransformRequest::default()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use crate::bundler::testing::StubBundler;
    use crate::logger::{Logger, MemorySink};
    use crate::options::{Entry, Format, NormalizedOptions};
    use crate::plugin::PluginContext;

    pub fn context(
        format: Format,
        edit: impl FnOnce(&mut NormalizedOptions),
    ) -> (PluginContext, Arc<StubBundler>, Arc<MemorySink>) {
        let mut options = NormalizedOptions::new(Path::new("/project"), Entry::List(vec!["src/index.ts".into()]));
        edit(&mut options);
        let bundler = Arc::new(StubBundler::default());
        let sink = MemorySink::new();
        let ctx = PluginContext {
            format,
            splitting: options.splitting.unwrap_or(false),
            options: Arc::new(options),
            logger: Logger::memory(sink.clone()),
            bundler: bundler.clone(),
        };
        (ctx, bundler, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_in_transform_order() {
        let names: Vec<String> = builtin_plugins()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "shebang",
                "tree-shaking",
                "cjs-splitting",
                "es5-target",
                "alternate-minifier",
                "size-reporter",
                "cjs-interop"
            ]
        );
    }
}
