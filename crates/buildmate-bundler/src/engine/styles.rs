//! Stylesheet post-processing.
//!
//! CSS chunks are recompiled with lightningcss. One pass per build owns the
//! shared [`StyleSheetMap`] and stores what it compiled; the other formats
//! reuse those results instead of compiling the same sheet again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bundler::{BundledFile, Metafile};
use crate::options::NormalizedOptions;
use crate::plugin::sourcemap::strip_reference_comment;
use crate::plugin::{is_css, is_js};
use crate::{Error, Result, glob};

/// Compiled stylesheets keyed by file name relative to the format's output
/// directory. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct StyleSheetMap {
    inner: Arc<Mutex<FxHashMap<String, String>>>,
}

impl StyleSheetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, css: impl Into<String>) {
        self.inner.lock().insert(key.into(), css.into());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

pub fn compile_css(path: &Path, source: &str, minify: bool) -> Result<String> {
    let css_error = |message: String| Error::Css {
        path: path.display().to_string(),
        message,
    };

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: path.to_string_lossy().to_string(),
            ..Default::default()
        },
    )
    .map_err(|e| css_error(format!("{e:?}")))?;

    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| css_error(format!("{e:?}")))?;
    }

    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            ..Default::default()
        })
        .map_err(|e| css_error(format!("{e:?}")))?;

    Ok(result.code)
}

/// DOM prelude appending `css` to the document head.
pub fn style_inject_snippet(css: &str) -> String {
    let literal = serde_json::Value::String(css.to_string()).to_string();
    format!(
        "(function(){{var css={literal};if(!css||typeof document===\"undefined\")return;\
var head=document.head||document.getElementsByTagName(\"head\")[0];\
var style=document.createElement(\"style\");style.type=\"text/css\";head.appendChild(style);\
if(style.styleSheet){{style.styleSheet.cssText=css}}else{{style.appendChild(document.createTextNode(css))}}}})();"
    )
}

/// Per-pass stylesheet handling before the plugin pipeline sees the files.
pub(crate) struct StylePass<'a> {
    pub options: &'a NormalizedOptions,
    pub out_dir: &'a Path,
    pub styles: &'a StyleSheetMap,
    /// Whether this pass owns the shared map.
    pub writer: bool,
}

impl StylePass<'_> {
    fn key(&self, path: &Path) -> String {
        glob::slash(&path.strip_prefix(self.out_dir).unwrap_or(path).to_string_lossy())
    }

    fn minify(&self) -> bool {
        self.options.minify.enabled() || self.options.minify_whitespace
    }

    fn cwd_key(&self, path: &Path) -> String {
        glob::slash(
            &path
                .strip_prefix(&self.options.cwd)
                .unwrap_or(path)
                .to_string_lossy(),
        )
    }

    pub fn apply(&self, files: &mut Vec<BundledFile>, metafile: &Metafile) -> Result<()> {
        let mut stale_maps: FxHashSet<PathBuf> = FxHashSet::default();

        for file in files.iter_mut().filter(|f| is_css(&f.path)) {
            let key = self.key(&file.path);
            let cached = if self.writer { None } else { self.styles.get(&key) };
            let css = match cached {
                Some(css) => css,
                None => {
                    let source = String::from_utf8_lossy(&file.contents);
                    let css = compile_css(
                        &file.path,
                        strip_reference_comment(&source),
                        self.minify(),
                    )?;
                    if self.writer {
                        self.styles.insert(key, css.clone());
                    }
                    css
                }
            };
            file.contents = css.into_bytes();

            let mut map = file.path.clone().into_os_string();
            map.push(".map");
            stale_maps.insert(PathBuf::from(map));
        }

        if !stale_maps.is_empty() {
            tracing::debug!(count = stale_maps.len(), "dropping stylesheet maps after recompiling");
            files.retain(|f| !stale_maps.contains(&f.path));
        }

        if self.options.inject_style {
            self.inject(files, metafile);
        }
        Ok(())
    }

    /// Move each stylesheet into the JS outputs that import it. Sheets no JS
    /// output references are left in place.
    fn inject(&self, files: &mut Vec<BundledFile>, metafile: &Metafile) {
        let sheets: FxHashMap<String, String> = files
            .iter()
            .filter(|f| is_css(&f.path))
            .map(|f| {
                (
                    self.cwd_key(&f.path),
                    String::from_utf8_lossy(&f.contents).into_owned(),
                )
            })
            .collect();
        if sheets.is_empty() {
            return;
        }

        let mut injected: FxHashSet<String> = FxHashSet::default();
        for file in files.iter_mut().filter(|f| is_js(&f.path)) {
            let key = self.cwd_key(&file.path);
            let Some(bundle) = metafile
                .outputs
                .get(&key)
                .and_then(|output| output.css_bundle.as_ref())
            else {
                continue;
            };
            let Some(css) = sheets.get(bundle) else {
                continue;
            };

            let code = String::from_utf8_lossy(&file.contents);
            let code = format!(
                "{}\n{}\n",
                strip_reference_comment(&code),
                style_inject_snippet(css)
            );
            file.contents = code.into_bytes();
            injected.insert(bundle.clone());
        }

        files.retain(|f| !(is_css(&f.path) && injected.contains(&self.cwd_key(&f.path))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::MetaOutput;
    use crate::options::Entry;

    fn options() -> NormalizedOptions {
        NormalizedOptions::new("/p", Entry::List(vec!["src/index.ts".into()]))
    }

    fn file(path: &str, contents: &str) -> BundledFile {
        BundledFile {
            path: PathBuf::from(path),
            contents: contents.as_bytes().to_vec(),
        }
    }

    #[test]
    fn minifies_when_asked() {
        let css = compile_css(Path::new("a.css"), ".a {\n  color: red;\n}\n", true).unwrap();
        assert_eq!(css, ".a{color:red}");
    }

    #[test]
    fn writer_fills_map_and_reader_reuses_it() {
        let opts = options();
        let styles = StyleSheetMap::new();
        let out_dir = Path::new("/p/dist");

        let mut first = vec![file("/p/dist/index.css", ".a { color: red; }")];
        StylePass {
            options: &opts,
            out_dir,
            styles: &styles,
            writer: true,
        }
        .apply(&mut first, &Metafile::default())
        .unwrap();
        assert_eq!(styles.len(), 1);

        styles.insert("index.css", ".cached{}");
        let mut second = vec![file("/p/dist/index.css", ".a { color: red; }")];
        StylePass {
            options: &opts,
            out_dir,
            styles: &styles,
            writer: false,
        }
        .apply(&mut second, &Metafile::default())
        .unwrap();
        assert_eq!(second[0].contents, b".cached{}");
    }

    #[test]
    fn stale_css_maps_are_dropped() {
        let opts = options();
        let mut files = vec![
            file("/p/dist/index.css", ".a { color: red; }"),
            file("/p/dist/index.css.map", "{}"),
            file("/p/dist/index.js.map", "{}"),
        ];
        StylePass {
            options: &opts,
            out_dir: Path::new("/p/dist"),
            styles: &StyleSheetMap::new(),
            writer: true,
        }
        .apply(&mut files, &Metafile::default())
        .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("/p/dist/index.css"), PathBuf::from("/p/dist/index.js.map")]
        );
    }

    #[test]
    fn inject_style_moves_css_into_js() {
        let mut opts = options();
        opts.inject_style = true;
        let mut metafile = Metafile::default();
        metafile.outputs.insert(
            "dist/index.js".into(),
            MetaOutput {
                css_bundle: Some("dist/index.css".into()),
                ..Default::default()
            },
        );

        let mut files = vec![
            file("/p/dist/index.css", ".a { color: red; }"),
            file("/p/dist/index.js", "console.log(1);\n//# sourceMappingURL=index.js.map\n"),
        ];
        StylePass {
            options: &opts,
            out_dir: Path::new("/p/dist"),
            styles: &StyleSheetMap::new(),
            writer: true,
        }
        .apply(&mut files, &metafile)
        .unwrap();

        assert_eq!(files.len(), 1);
        let js = String::from_utf8(files[0].contents.clone()).unwrap();
        assert!(js.starts_with("console.log(1);\n(function(){var css="));
        assert!(js.contains("color: red"));
        assert!(!js.contains("sourceMappingURL"));
    }

    #[test]
    fn snippet_escapes_css() {
        let snippet = style_inject_snippet("a::after { content: \"x\" }");
        assert!(snippet.contains(r#"var css="a::after { content: \"x\" }";"#));
    }
}
