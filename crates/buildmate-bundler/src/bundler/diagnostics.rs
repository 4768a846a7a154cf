//! Bundler diagnostics.
//!
//! esbuild reports errors and warnings as text blocks on stderr:
//!
//! ```text
//! ✘ [ERROR] Could not resolve "foo"
//!
//!     src/index.ts:1:7:
//!       1 │ import "foo"
//!         ╵        ~~~~~
//!
//!   You can mark the path "foo" as external to exclude it from the bundle.
//! ```
//!
//! [`parse`] turns those blocks into [`Message`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub line_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub location: Option<Location>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Message {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
            location: None,
            notes: Vec::new(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => {
                write!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.column, self.text)?;
                if let Some(text) = &loc.line_text {
                    write!(f, "\n    {text}")?;
                }
            }
            None => write!(f, "{}", self.text)?,
        }
        for note in &self.notes {
            write!(f, "\n  {note}")?;
        }
        Ok(())
    }
}

fn header(line: &str) -> Option<(Severity, &str)> {
    let trimmed = line.trim_start();
    for (marker, severity) in [("[ERROR] ", Severity::Error), ("[WARNING] ", Severity::Warning)] {
        if let Some(idx) = trimmed.find(marker) {
            // Only the leading icon may precede the marker.
            if idx <= 4 {
                return Some((severity, trimmed[idx + marker.len()..].trim_end()));
            }
        }
    }
    None
}

fn location(line: &str) -> Option<(String, u32, u32)> {
    let rest = line.trim().strip_suffix(':')?;
    let (rest, column) = rest.rsplit_once(':')?;
    let (file, line_no) = rest.rsplit_once(':')?;
    Some((file.to_string(), line_no.parse().ok()?, column.parse().ok()?))
}

fn source_line(line: &str) -> Option<String> {
    let (number, text) = line.split_once('│')?;
    number.trim().parse::<u32>().ok()?;
    Some(text.strip_prefix(' ').unwrap_or(text).to_string())
}

/// Parse esbuild's stderr into messages. Unrecognized lines are ignored.
pub fn parse(stderr: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for line in stderr.lines() {
        if let Some((severity, text)) = header(line) {
            // Strip the trailing `[rule-name]` tag.
            let text = match text.rfind(" [") {
                Some(idx) if text.ends_with(']') => &text[..idx],
                _ => text,
            };
            messages.push(Message {
                severity,
                text: text.to_string(),
                location: None,
                notes: Vec::new(),
            });
            continue;
        }

        let Some(current) = messages.last_mut() else {
            continue;
        };
        if line.trim().is_empty() || !line.starts_with(' ') {
            continue;
        }

        if current.location.is_none() && current.notes.is_empty() {
            if let Some((file, line_no, column)) = location(line) {
                current.location = Some(Location {
                    file,
                    line: line_no,
                    column,
                    line_text: None,
                });
                continue;
            }
        }

        if let Some(loc) = current.location.as_mut() {
            if loc.line_text.is_none() {
                if let Some(text) = source_line(line) {
                    loc.line_text = Some(text);
                    continue;
                }
            }
        }

        let trimmed = line.trim();
        if trimmed.starts_with('╵') || trimmed.starts_with('~') || trimmed.starts_with('^') {
            continue;
        }
        current.notes.push(trimmed.to_string());
    }

    messages
}

/// Drop warnings that are noise for library builds: anything located in an
/// internal virtual module, and esbuild's notices about unbundled `require`
/// calls.
pub fn filter_warnings(warnings: Vec<Message>) -> Vec<Message> {
    warnings
        .into_iter()
        .filter(|warning| {
            if warning
                .location
                .as_ref()
                .is_some_and(|loc| loc.file.starts_with("internal"))
            {
                return false;
            }
            !(warning
                .text
                .contains(r#"This call to "require" will not be bundled because"#)
                || warning
                    .text
                    .contains(r#"Indirect calls to "require" will not be bundled"#))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STDERR: &str = r#"▲ [WARNING] "import.meta" is not available in the configured target environment [empty-import-meta]

    src/index.ts:1:12:
      1 │ console.log(import.meta.url)
        ╵             ~~~~~~~~~~~

✘ [ERROR] Could not resolve "foo"

    src/index.ts:2:7:
      2 │ import "foo"
        ╵        ~~~~~

  You can mark the path "foo" as external to exclude it from the bundle.

1 warning and 1 error
"#;

    #[test]
    fn parses_errors_and_warnings() {
        let messages = parse(STDERR);
        assert_eq!(messages.len(), 2);

        let warning = &messages[0];
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(
            warning.text,
            r#""import.meta" is not available in the configured target environment"#
        );

        let error = &messages[1];
        assert_eq!(error.severity, Severity::Error);
        assert_eq!(error.text, r#"Could not resolve "foo""#);
        let loc = error.location.as_ref().unwrap();
        assert_eq!((loc.file.as_str(), loc.line, loc.column), ("src/index.ts", 2, 7));
        assert_eq!(loc.line_text.as_deref(), Some(r#"import "foo""#));
        assert_eq!(error.notes.len(), 1);
    }

    #[test]
    fn display_includes_location() {
        let error = &parse(STDERR)[1];
        assert!(error.to_string().starts_with(r#"src/index.ts:2:7: Could not resolve "foo""#));
    }

    #[test]
    fn filters_known_noise() {
        let mut internal = Message::error("something odd");
        internal.severity = Severity::Warning;
        internal.location = Some(Location {
            file: "internal:shim".into(),
            line: 1,
            column: 0,
            line_text: None,
        });
        let mut require = Message::error(
            r#"This call to "require" will not be bundled because the argument is not a string literal"#,
        );
        require.severity = Severity::Warning;
        let mut kept = Message::error("real warning");
        kept.severity = Severity::Warning;

        let filtered = filter_warnings(vec![internal, require, kept.clone()]);
        assert_eq!(filtered, vec![kept]);
    }
}
