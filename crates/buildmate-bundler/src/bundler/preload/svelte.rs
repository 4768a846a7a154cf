//! Svelte components.
//!
//! The markup is not compiled. A component loads as its script blocks, the
//! `context="module"` block first, and its `<style>` blocks become a sibling
//! stylesheet the module imports.

use std::path::Path;

use memchr::memmem;

use crate::engine::compile_css;
use crate::{Error, Result};

const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const MAX_BLOCKS: usize = 100;

/// A component split into its module code and optional stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub code: String,
    pub css: Option<String>,
}

/// Name of the stylesheet written next to a component.
pub fn stylesheet_name(component: &str) -> String {
    format!("{component}.css")
}

pub fn compile_component(path: &Path, source: &str) -> Result<Component> {
    let component_error = |message: String| Error::Component {
        path: path.display().to_string(),
        message,
    };

    if source.len() > MAX_FILE_SIZE {
        return Err(component_error(format!(
            "file is {} bytes, larger than the {MAX_FILE_SIZE} byte limit",
            source.len()
        )));
    }

    let scripts = blocks(source, "script").map_err(component_error)?;
    let styles = blocks(source, "style").map_err(component_error)?;

    let css = if styles.is_empty() {
        None
    } else {
        let mut sheet = String::new();
        for style in &styles {
            let lang = attribute(style.attrs, "lang").unwrap_or("css");
            if !matches!(lang, "css" | "text/css") {
                return Err(component_error(format!(
                    "<style lang=\"{lang}\"> needs a preprocessor; only plain CSS is supported"
                )));
            }
            sheet.push_str(style.content);
            sheet.push('\n');
        }
        Some(compile_css(path, &sheet, false)?)
    };

    let mut code = String::new();
    if css.is_some() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        code.push_str(&format!("import \"./{}\";\n", stylesheet_name(&name)));
    }
    if scripts.is_empty() {
        code.push_str("export default {};\n");
    } else {
        code.push_str(&combine_scripts(&scripts));
    }

    Ok(Component { code, css })
}

/// Module context first, then the instance script.
fn combine_scripts(scripts: &[Block<'_>]) -> String {
    let (module, instance): (Vec<&Block<'_>>, Vec<&Block<'_>>) =
        scripts.iter().partition(|block| is_module_context(block.attrs));
    module
        .into_iter()
        .chain(instance)
        .map(|block| block.content.trim_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_module_context(attrs: &str) -> bool {
    attribute(attrs, "context") == Some("module")
        || attrs.split_whitespace().any(|word| word == "module")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block<'a> {
    attrs: &'a str,
    content: &'a str,
}

/// Every top-level `<tag ...>...</tag>` block, in source order.
fn blocks<'a>(source: &'a str, tag: &str) -> std::result::Result<Vec<Block<'a>>, String> {
    let bytes = source.as_bytes();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut pointer = 0;

    while let Some(offset) = memmem::find(&bytes[pointer..], open.as_bytes()) {
        let start = pointer + offset;
        pointer = start + open.len();

        // `<scripts>` or `<styles-x>` are not this tag.
        if bytes
            .get(pointer)
            .is_some_and(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/'))
        {
            continue;
        }

        let Some(tag_end) = closing_angle(bytes, pointer) else {
            return Err(format!("unclosed <{tag}> at offset {start}"));
        };
        let attrs = source[pointer..tag_end].trim();
        pointer = tag_end + 1;

        let block = if attrs.ends_with('/') {
            Block {
                attrs: attrs.trim_end_matches('/').trim_end(),
                content: "",
            }
        } else {
            let Some(end) = memmem::find(&bytes[pointer..], close.as_bytes()) else {
                return Err(format!("missing {close} for the block at offset {start}"));
            };
            let content = &source[pointer..pointer + end];
            pointer += end + close.len();
            Block { attrs, content }
        };

        found.push(block);
        if found.len() > MAX_BLOCKS {
            return Err(format!("more than {MAX_BLOCKS} <{tag}> blocks"));
        }
    }
    Ok(found)
}

/// Position of the `>` ending an opening tag, skipping quoted values.
fn closing_angle(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &byte) in bytes[start..].iter().enumerate() {
        match (byte, quote) {
            (b'"' | b'\'', None) => quote = Some(byte),
            (b, Some(q)) if b == q => quote = None,
            (b'>', None) => return Some(start + i),
            _ => {}
        }
    }
    None
}

/// Value of `name="..."`, `name='...'` or `name=value` in a tag's attributes.
fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=");
    let mut rest = attrs;
    while let Some(pos) = rest.find(&needle) {
        let boundary = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let value = rest[pos + needle.len()..].trim_start();
        if !boundary {
            rest = value;
            continue;
        }
        return match value.chars().next() {
            Some(quote @ ('"' | '\'')) => value[1..].find(quote).map(|end| &value[1..=end]),
            Some(_) => Some(
                value
                    .split(|c: char| c.is_whitespace() || c == '>')
                    .next()
                    .unwrap_or(value),
            ),
            None => None,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Component {
        compile_component(Path::new("/p/src/Button.svelte"), source).unwrap()
    }

    #[test]
    fn module_context_comes_before_the_instance_script() {
        let component = compile(
            r#"<script lang="ts">
let count: number = 0;
</script>
<script context="module">
export const shared = 'data';
</script>
<button>{count}</button>
"#,
        );
        assert_eq!(
            component.code,
            "export const shared = 'data';\n\nlet count: number = 0;"
        );
        assert_eq!(component.css, None);
    }

    #[test]
    fn styles_are_compiled_and_imported() {
        let component = compile(
            "<script>\nexport let label;\n</script>\n<style>\n.btn {\n  color: red;\n}\n</style>\n",
        );
        assert!(component.code.starts_with("import \"./Button.svelte.css\";\n"));
        assert!(component.code.ends_with("export let label;"));
        let css = component.css.unwrap();
        assert!(css.contains(".btn"));
        assert!(css.contains("color: red"));
    }

    #[test]
    fn markup_only_component_exports_an_empty_module() {
        let component = compile("<h1>Hello</h1>\n");
        assert_eq!(component.code, "export default {};\n");
    }

    #[test]
    fn quoted_angle_brackets_do_not_end_the_tag() {
        let found = blocks(r#"<script data-x="a>b">let a = 1;</script>"#, "script").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attrs, r#"data-x="a>b""#);
        assert_eq!(found[0].content, "let a = 1;");
    }

    #[test]
    fn similar_tag_names_are_skipped() {
        let found = blocks("<scripts></scripts><script>x</script>", "script").unwrap();
        assert_eq!(found, vec![Block { attrs: "", content: "x" }]);
    }

    #[test]
    fn svelte_5_module_attribute_counts_as_module_context() {
        assert!(is_module_context("module lang=\"ts\""));
        assert!(is_module_context("context='module'"));
        assert!(!is_module_context("lang=\"ts\""));
    }

    #[test]
    fn attribute_values_quoted_or_bare() {
        assert_eq!(attribute(r#"lang="ts""#, "lang"), Some("ts"));
        assert_eq!(attribute("lang='ts' context=module", "context"), Some("module"));
        assert_eq!(attribute("xml:lang=\"en\"", "lang"), None);
    }

    #[test]
    fn unclosed_script_is_an_error() {
        let err = compile_component(Path::new("A.svelte"), "<script>let a;").unwrap_err();
        assert!(matches!(err, Error::Component { .. }));
        assert!(err.to_string().contains("missing </script>"));
    }

    #[test]
    fn preprocessed_styles_are_rejected() {
        let err =
            compile_component(Path::new("A.svelte"), "<style lang=\"scss\">a{}</style>").unwrap_err();
        assert!(err.to_string().contains("scss"));
    }
}
