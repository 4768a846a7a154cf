//! Value parsers shared by the build flags.

/// `KEY=VALUE`. The value may itself contain `=`; it may be empty.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing key in `{raw}`")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

/// Flatten comma-separated values: `["cjs,esm", "iife"]` -> `[cjs, esm, iife]`.
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn Windows separators into `/` so entries work as glob patterns.
///
/// Extended-length paths (`\\?\`) and paths with non-ASCII characters are
/// left alone.
pub fn normalize_entry_path(path: &str) -> String {
    if path.starts_with(r"\\?\") || !path.is_ascii() {
        return path.to_string();
    }
    path.replace('\\', "/")
}
