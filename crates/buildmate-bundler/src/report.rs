//! Output size reporting.

use owo_colors::OwoColorize;

use crate::logger::Logger;

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Human-readable size in base 1024 with two decimals (`1.50 kB`).
pub fn pretty_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }
    format!("{value:.2} {}", UNITS[exponent])
}

/// Log one `name  size` line per file, names padded to a common width.
pub fn report_size<S: AsRef<str>>(logger: &Logger, label: &str, files: &[(S, u64)]) {
    let width = files
        .iter()
        .map(|(name, _)| name.as_ref().chars().count())
        .max()
        .unwrap_or(0)
        + 1;
    let color = logger.settings().use_color();

    for (name, size) in files {
        let name = format!("{:<width$}", name.as_ref());
        let size = pretty_bytes(*size);
        if color {
            logger.success(label, format!("{}{}", name.bold(), size.green()));
        } else {
            logger.success(label, format!("{name}{size}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemorySink;

    #[test]
    fn formats_sizes() {
        assert_eq!(pretty_bytes(0), "0 B");
        assert_eq!(pretty_bytes(100), "100.00 B");
        assert_eq!(pretty_bytes(1536), "1.50 kB");
        assert_eq!(pretty_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn pads_names() {
        let sink = MemorySink::new();
        let logger = Logger::memory(sink.clone());
        report_size(&logger, "CJS", &[("dist/index.js", 10), ("dist/a.js", 2048)]);

        let lines: Vec<String> = sink.lines().into_iter().map(|(_, l)| l).collect();
        assert_eq!(
            lines,
            vec![
                "CJS dist/index.js 10.00 B".to_string(),
                "CJS dist/a.js     2.00 kB".to_string(),
            ]
        );
    }
}
