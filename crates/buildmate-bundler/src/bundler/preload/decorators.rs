//! Legacy decorators with `design:*` type metadata (`emitDecoratorMetadata`).
//!
//! Neither bundler emits the metadata, so decorated sources are compiled with
//! the oxc transformer first. Helper calls import from a runtime directory
//! the caller writes with [`HELPERS`].

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{
    DecoratorOptions, HelperLoaderMode, HelperLoaderOptions, TransformOptions, Transformer,
};

/// Helper modules under `<runtime>/helpers/`, as `(name, source)`.
pub const HELPERS: &[(&str, &str)] = &[
    (
        "decorate",
        r#"export default function _decorate(decorators, target, key, desc) {
  var c = arguments.length, r = c < 3 ? target : desc === null ? desc = Object.getOwnPropertyDescriptor(target, key) : desc, d;
  if (typeof Reflect === "object" && typeof Reflect.decorate === "function") r = Reflect.decorate(decorators, target, key, desc);
  else for (var i = decorators.length - 1; i >= 0; i--) if (d = decorators[i]) r = (c < 3 ? d(r) : c > 3 ? d(target, key, r) : d(target, key)) || r;
  return c > 3 && r && Object.defineProperty(target, key, r), r;
}
"#,
    ),
    (
        "decorateMetadata",
        r#"export default function _decorateMetadata(k, v) {
  if (typeof Reflect === "object" && typeof Reflect.metadata === "function") return Reflect.metadata(k, v);
}
"#,
    ),
    (
        "decorateParam",
        r#"export default function _decorateParam(paramIndex, decorator) {
  return function (target, key) { decorator(target, key, paramIndex); };
}
"#,
    ),
];

/// Whether `path` is a source the decorator pass reads.
pub fn is_candidate(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.ends_with(".d.ts") {
        return false;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "js" | "jsx")
    )
}

/// Compile decorators in `source` to legacy calls with metadata.
///
/// Returns `None` when the source has no decorator syntax or does not parse;
/// the bundler reports syntax errors itself. `runtime` is the module prefix
/// helper imports are resolved against. With `sourcemap`, an inline map
/// pointing at the original file is appended.
pub fn emit_decorator_metadata(
    path: &Path,
    source: &str,
    runtime: &str,
    sourcemap: bool,
) -> Option<String> {
    if !source.contains('@') {
        return None;
    }
    let source_type = SourceType::from_path(path).ok()?;
    let allocator = Allocator::default();

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        tracing::debug!(path = %path.display(), "skipping decorator pass for a file that does not parse");
        return None;
    }
    let mut program = parsed.program;

    let mut options = TransformOptions::default();
    options.decorator = DecoratorOptions {
        legacy: true,
        emit_decorator_metadata: true,
    };
    options.helper_loader = HelperLoaderOptions {
        module_name: Cow::Owned(runtime.to_string()),
        mode: HelperLoaderMode::Runtime,
    };
    // JSX is left for the bundler's own factory settings.
    options.jsx.jsx_plugin = false;
    options.jsx.display_name_plugin = false;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let transformed =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        let messages: Vec<String> = transformed.errors.iter().map(|e| e.to_string()).collect();
        tracing::warn!(path = %path.display(), errors = ?messages, "decorator transform failed");
        return None;
    }

    let file_name = path.file_name().map(PathBuf::from);
    let codegen = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: file_name.filter(|_| sourcemap),
            ..CodegenOptions::default()
        })
        .build(&program);

    let mut code = codegen.code;
    if let Some(map) = codegen.map {
        code.push_str("\n//# sourceMappingURL=");
        code.push_str(&map.to_data_url());
        code.push('\n');
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNTIME: &str = "/p/.build-mate-src-x/__runtime";

    fn run(name: &str, source: &str) -> Option<String> {
        emit_decorator_metadata(Path::new(name), source, RUNTIME, false)
    }

    #[test]
    fn decorated_class_gains_design_metadata() {
        let source = r#"
function Inject(): ParameterDecorator & PropertyDecorator { return () => {}; }
class Service {}
export class Controller {
  @Inject() service!: Service;
  constructor(@Inject() readonly other: Service) {}
}
"#;
        let code = run("src/controller.ts", source).unwrap();
        assert!(code.contains("design:type"), "{code}");
        assert!(code.contains("design:paramtypes"), "{code}");
        assert!(code.contains(&format!("{RUNTIME}/helpers/decorate")), "{code}");
        assert!(!code.contains("readonly other: Service"));
    }

    #[test]
    fn undecorated_sources_are_left_alone() {
        assert_eq!(run("src/a.ts", "export const a: number = 1;"), None);
        assert_eq!(run("src/a.ts", "export const @broken = ;"), None);
    }

    #[test]
    fn sourcemap_is_inlined() {
        let code = emit_decorator_metadata(
            Path::new("src/a.ts"),
            "const d = (t: any) => t;\n@d class A {}\nexport { A };\n",
            RUNTIME,
            true,
        )
        .unwrap();
        assert!(code.contains("//# sourceMappingURL=data:application/json;base64,"));
    }

    #[test]
    fn declarations_and_other_files_are_not_candidates() {
        assert!(is_candidate(Path::new("src/a.tsx")));
        assert!(is_candidate(Path::new("src/a.js")));
        assert!(!is_candidate(Path::new("src/a.d.ts")));
        assert!(!is_candidate(Path::new("src/a.mts")));
        assert!(!is_candidate(Path::new("src/a.css")));
    }
}
