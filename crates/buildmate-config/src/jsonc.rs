//! JSON-with-comments support.
//!
//! `tsconfig.json` and build-mate's own JSON config files are allowed to carry
//! `//` and `/* */` comments and trailing commas. [`strip`] rewrites such text
//! into plain JSON so serde can read it.

use serde::de::DeserializeOwned;

/// Remove comments and trailing commas outside of string literals.
pub fn strip(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    // Index in `out` of a comma that may turn out to be trailing.
    let mut pending_comma: Option<usize> = None;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                pending_comma = None;
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            ',' => {
                pending_comma = Some(out.len());
                out.push(c);
            }
            '}' | ']' => {
                if let Some(idx) = pending_comma.take() {
                    out.replace_range(idx..idx + 1, " ");
                }
                out.push(c);
            }
            c if c.is_whitespace() => out.push(c),
            _ => {
                pending_comma = None;
                out.push(c);
            }
        }
    }

    out
}

/// Parse JSON-with-comments text into `T`.
pub fn from_str<T: DeserializeOwned>(input: &str) -> serde_json::Result<T> {
    serde_json::from_str(&strip(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn strips_line_and_block_comments() {
        let input = r#"{
            // line comment
            "a": 1, /* block
            comment */ "b": "x // not a comment"
        }"#;
        let value: Value = from_str(input).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], "x // not a comment");
    }

    #[test]
    fn removes_trailing_commas() {
        let value: Value = from_str(r#"{ "list": [1, 2, ], "obj": { "k": true, }, }"#).unwrap();
        assert_eq!(value["list"], serde_json::json!([1, 2]));
        assert_eq!(value["obj"]["k"], true);
    }

    #[test]
    fn keeps_escaped_quotes_inside_strings() {
        let value: Value = from_str(r#"{ "s": "say \"hi\", /* ok */" }"#).unwrap();
        assert_eq!(value["s"], "say \"hi\", /* ok */");
    }
}
