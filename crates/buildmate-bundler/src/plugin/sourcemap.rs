//! Source-map chaining and reference comments.

use std::path::Path;

use oxc_sourcemap::{SourceMap, SourceMapBuilder};
use rustc_hash::FxHashMap;

use super::is_css;
use crate::{Error, Result};

pub fn parse(json: &str) -> Result<SourceMap> {
    SourceMap::from_json_string(json).map_err(|e| Error::SourceMap(format!("{e:?}")))
}

/// A flattened token: generated position, original position, source and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    dst_line: u32,
    dst_col: u32,
    src_line: u32,
    src_col: u32,
    source: Option<u32>,
    name: Option<u32>,
}

fn mappings(map: &SourceMap) -> Vec<Mapping> {
    let mut out: Vec<Mapping> = map
        .get_tokens()
        .map(|t| Mapping {
            dst_line: t.get_dst_line(),
            dst_col: t.get_dst_col(),
            src_line: t.get_src_line(),
            src_col: t.get_src_col(),
            source: t.get_source_id(),
            name: t.get_name_id(),
        })
        .collect();
    out.sort_by_key(|m| (m.dst_line, m.dst_col));
    out
}

/// Closest mapping at or before `(line, col)` on the same generated line.
fn lookup(sorted: &[Mapping], line: u32, col: u32) -> Option<&Mapping> {
    let idx = sorted.partition_point(|m| (m.dst_line, m.dst_col) <= (line, col));
    let candidate = sorted.get(idx.checked_sub(1)?)?;
    (candidate.dst_line == line).then_some(candidate)
}

/// Original position for a generated position, as `(source, line, col)`.
pub fn trace(map: &SourceMap, line: u32, col: u32) -> Option<(String, u32, u32)> {
    let sorted = mappings(map);
    let found = lookup(&sorted, line, col)?;
    let sources: Vec<String> = map.get_sources().map(|s| s.to_string()).collect();
    let source = sources.get(found.source? as usize)?.clone();
    Some((source, found.src_line, found.src_col))
}

/// Chain `next` on top of `prior`.
///
/// `prior` maps the input of a transform back to the original sources,
/// `next` maps the transform's output back to its input. The result maps the
/// output straight to the original sources. Tokens of `next` whose position
/// has no counterpart in `prior` are dropped.
pub fn compose(prior: &SourceMap, next: &SourceMap, file: Option<&str>) -> SourceMap {
    let prior_tokens = mappings(prior);
    let prior_sources: Vec<String> = prior.get_sources().map(|s| s.to_string()).collect();
    let prior_contents: Vec<Option<String>> = prior
        .get_source_contents()
        .map(|c| c.map(|c| c.to_string()))
        .collect();
    let prior_names: Vec<String> = prior.get_names().map(|n| n.to_string()).collect();
    let next_names: Vec<String> = next.get_names().map(|n| n.to_string()).collect();

    let mut builder = SourceMapBuilder::default();
    if let Some(file) = file {
        builder.set_file(file);
    }
    let mut source_ids: FxHashMap<u32, u32> = FxHashMap::default();
    let mut name_ids: FxHashMap<String, u32> = FxHashMap::default();

    for token in mappings(next) {
        if token.source.is_none() {
            continue;
        }
        let Some(origin) = lookup(&prior_tokens, token.src_line, token.src_col) else {
            continue;
        };
        let Some(prior_source) = origin.source else {
            continue;
        };

        let source_id = match source_ids.get(&prior_source) {
            Some(id) => *id,
            None => {
                let name = prior_sources
                    .get(prior_source as usize)
                    .map(String::as_str)
                    .unwrap_or_default();
                let content = prior_contents
                    .get(prior_source as usize)
                    .and_then(|c| c.as_deref())
                    .unwrap_or_default();
                let id = builder.add_source_and_content(name, content);
                source_ids.insert(prior_source, id);
                id
            }
        };

        let name = origin
            .name
            .and_then(|id| prior_names.get(id as usize))
            .or_else(|| token.name.and_then(|id| next_names.get(id as usize)));
        let name_id = name.map(|name| match name_ids.get(name) {
            Some(id) => *id,
            None => {
                let id = builder.add_name(name);
                name_ids.insert(name.clone(), id);
                id
            }
        });

        builder.add_token(
            token.dst_line,
            token.dst_col,
            origin.src_line,
            origin.src_col,
            Some(source_id),
            name_id,
        );
    }

    builder.into_sourcemap()
}

/// Chain an optional replacement map onto an optional prior map.
///
/// With no prior map the replacement is taken as is. A transform that returns
/// no map leaves the prior one in place.
pub fn chain(
    prior: Option<SourceMap>,
    next: Option<SourceMap>,
    file: Option<&str>,
) -> Option<SourceMap> {
    match (prior, next) {
        (Some(prior), Some(next)) => Some(compose(&prior, &next, file)),
        (None, Some(next)) => Some(next),
        (prior, None) => prior,
    }
}

/// Reference comment appended to a chunk.
///
/// `inline` embeds the map as a base64 data URL; otherwise the comment points
/// at `<file name>.map` next to the chunk.
pub fn reference_comment(chunk_path: &Path, map: &SourceMap, inline: bool) -> String {
    let url = if inline {
        map.to_data_url()
    } else {
        let file_name = chunk_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{file_name}.map")
    };

    if is_css(chunk_path) {
        format!("/*# sourceMappingURL={url} */")
    } else {
        format!("//# sourceMappingURL={url}")
    }
}

/// Remove a trailing `sourceMappingURL` comment left by an earlier stage.
pub fn strip_reference_comment(code: &str) -> &str {
    let trimmed = code.trim_end();
    let last_line_start = trimmed.rfind('\n').map_or(0, |i| i + 1);
    let last_line = &trimmed[last_line_start..];
    if last_line.starts_with("//# sourceMappingURL=") || last_line.starts_with("/*# sourceMappingURL=")
    {
        trimmed[..last_line_start].trim_end_matches('\n')
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A map where every listed generated position maps to the given
    /// position in `source`.
    fn map_of(source: &str, points: &[((u32, u32), (u32, u32))]) -> SourceMap {
        let mut builder = SourceMapBuilder::default();
        let id = builder.add_source_and_content(source, "");
        for ((dl, dc), (sl, sc)) in points {
            builder.add_token(*dl, *dc, *sl, *sc, Some(id), None);
        }
        builder.into_sourcemap()
    }

    #[test]
    fn composed_map_traces_to_original_source() {
        // original -> bundled
        let m = map_of("src/index.ts", &[((0, 0), (3, 4)), ((1, 2), (7, 0))]);
        // bundled -> T1 output (adds a line on top)
        let t1 = map_of("index.js", &[((1, 0), (0, 0)), ((2, 2), (1, 2))]);
        // T1 output -> T2 output (indents by two)
        let t2 = map_of("index.js", &[((1, 2), (1, 0)), ((2, 4), (2, 2))]);

        let step_by_step = compose(&compose(&m, &t1, None), &t2, None);
        let grouped = compose(&m, &compose(&t1, &t2, None), None);

        for (line, col) in [(1, 2), (2, 4)] {
            let sequential = trace(&t2, line, col)
                .and_then(|(_, l, c)| trace(&t1, l, c))
                .and_then(|(_, l, c)| trace(&m, l, c));
            assert_eq!(trace(&step_by_step, line, col), sequential);
            assert_eq!(trace(&grouped, line, col), sequential);
        }
        assert_eq!(
            trace(&step_by_step, 2, 4),
            Some(("src/index.ts".to_string(), 7, 0))
        );
    }

    #[test]
    fn chain_keeps_prior_when_transform_has_no_map() {
        let m = map_of("a.ts", &[((0, 0), (0, 0))]);
        let chained = chain(Some(m), None, None).unwrap();
        assert_eq!(trace(&chained, 0, 0), Some(("a.ts".to_string(), 0, 0)));
    }

    #[test]
    fn chain_without_prior_takes_replacement() {
        let next = map_of("a.js", &[((0, 0), (5, 1))]);
        let chained = chain(None, Some(next), None).unwrap();
        assert_eq!(trace(&chained, 0, 0), Some(("a.js".to_string(), 5, 1)));
    }

    #[test]
    fn reference_comment_syntax_depends_on_file_type() {
        let map = map_of("a.ts", &[((0, 0), (0, 0))]);
        assert_eq!(
            reference_comment(Path::new("/out/index.js"), &map, false),
            "//# sourceMappingURL=index.js.map"
        );
        assert_eq!(
            reference_comment(Path::new("/out/index.css"), &map, false),
            "/*# sourceMappingURL=index.css.map */"
        );
        assert!(
            reference_comment(Path::new("/out/index.js"), &map, true)
                .starts_with("//# sourceMappingURL=data:application/json;")
        );
    }

    #[test]
    fn strips_trailing_reference() {
        let code = "console.log(1);\n//# sourceMappingURL=index.js.map\n";
        assert_eq!(strip_reference_comment(code), "console.log(1);");
        assert_eq!(strip_reference_comment("a();\n"), "a();\n");
    }
}
