//! Declarations for a single module.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_codegen::Codegen;
use oxc_isolated_declarations::{IsolatedDeclarations, IsolatedDeclarationsOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::{Error, Result};

/// Declaration text for one module plus the specifiers it imports from.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub declaration: String,
    /// Import and re-export sources, in source order, deduplicated.
    pub specifiers: Vec<String>,
}

pub fn is_declaration_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".d.ts") || name.ends_with(".d.mts") || name.ends_with(".d.cts")
}

/// Parse `source` and generate its declarations with isolated declarations.
///
/// Hand-written `.d.ts` inputs are passed through unchanged.
pub fn emit(path: &Path, source: &str) -> Result<Emitted> {
    let display = path.display();
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path)
        .map_err(|_| Error::Dts(format!("{display}: not a TypeScript or JavaScript file")))?;

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if !parsed.errors.is_empty() {
        let messages: Vec<String> = parsed.errors.iter().map(|e| e.to_string()).collect();
        return Err(Error::Dts(format!("{display}: {}", messages.join(", "))));
    }

    let mut specifiers: Vec<String> = Vec::new();
    let mut push = |specifier: &str| {
        if !specifiers.iter().any(|s| s == specifier) {
            specifiers.push(specifier.to_string());
        }
    };
    for statement in &parsed.program.body {
        match statement {
            Statement::ImportDeclaration(decl) => push(decl.source.value.as_str()),
            Statement::ExportAllDeclaration(decl) => push(decl.source.value.as_str()),
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    push(source.value.as_str());
                }
            }
            _ => {}
        }
    }

    if is_declaration_file(path) {
        return Ok(Emitted {
            declaration: source.to_string(),
            specifiers,
        });
    }

    let transformed = IsolatedDeclarations::new(
        &allocator,
        IsolatedDeclarationsOptions {
            strip_internal: false,
        },
    )
    .build(&parsed.program);

    if !transformed.errors.is_empty() {
        let messages: Vec<String> = transformed.errors.iter().map(|e| e.to_string()).collect();
        return Err(Error::Dts(format!("{display}: {}", messages.join(", "))));
    }

    let declaration = Codegen::new().build(&transformed.program).code;
    Ok(Emitted {
        declaration,
        specifiers,
    })
}
