//! User-facing build log.
//!
//! A [`Logger`] is a cheap, clonable handle: an optional target name, a shared
//! [`LogSettings`] and a [`LogSink`]. One `LogSettings` is created per process
//! and handed to every component; the silent flag is set once after options
//! are normalized and only read afterwards.
//!
//! Lines render as `[NAME] LABEL message`. When silent, everything except
//! errors is dropped.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug)]
pub struct LogSettings {
    silent: AtomicBool,
    color: AtomicBool,
}

impl LogSettings {
    pub fn new(color: bool) -> Arc<Self> {
        Arc::new(Self {
            silent: AtomicBool::new(false),
            color: AtomicBool::new(color),
        })
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn set_color(&self, color: bool) {
        self.color.store(color, Ordering::Relaxed);
    }

    pub fn use_color(&self) -> bool {
        self.color.load(Ordering::Relaxed)
    }
}

/// A structured record crossing the declaration worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Log,
    Error,
}

/// Where rendered log lines end up.
pub trait LogSink: Send + Sync {
    fn write(&self, level: Level, line: &str);
}

/// stdout for regular lines, stderr for errors.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&self, level: Level, line: &str) {
        if level == Level::Error {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Worker-side sink: each line becomes a JSON [`LogRecord`] on stdout so the
/// parent process can forward it.
pub struct RelaySink;

impl LogSink for RelaySink {
    fn write(&self, level: Level, line: &str) {
        let record = LogRecord {
            kind: if level == Level::Error {
                RecordKind::Error
            } else {
                RecordKind::Log
            },
            text: line.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&record) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{json}");
            let _ = stdout.flush();
        }
    }
}

/// Collects lines in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: Level, line: &str) {
        self.lines.lock().push((level, line.to_string()));
    }
}

#[derive(Clone)]
pub struct Logger {
    name: Option<Arc<str>>,
    settings: Arc<LogSettings>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(settings: Arc<LogSettings>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: None,
            settings,
            sink,
        }
    }

    pub fn console(settings: Arc<LogSettings>) -> Self {
        Self::new(settings, Arc::new(ConsoleSink))
    }

    /// A logger writing into `sink` with colors off.
    pub fn memory(sink: Arc<MemorySink>) -> Self {
        Self::new(LogSettings::new(false), sink)
    }

    /// Same sink and settings, different target name.
    pub fn named(&self, name: Option<&str>) -> Self {
        Self {
            name: name.map(Arc::from),
            settings: Arc::clone(&self.settings),
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn settings(&self) -> &Arc<LogSettings> {
        &self.settings
    }

    pub fn is_silent(&self) -> bool {
        self.settings.is_silent()
    }

    pub fn info(&self, label: &str, message: impl fmt::Display) {
        self.log(Level::Info, label, message);
    }

    pub fn success(&self, label: &str, message: impl fmt::Display) {
        self.log(Level::Success, label, message);
    }

    pub fn warn(&self, label: &str, message: impl fmt::Display) {
        self.log(Level::Warn, label, message);
    }

    pub fn error(&self, label: &str, message: impl fmt::Display) {
        self.log(Level::Error, label, message);
    }

    pub fn log(&self, level: Level, label: &str, message: impl fmt::Display) {
        if level != Level::Error && self.is_silent() {
            return;
        }
        let line = self.render(level, label, &message.to_string());
        self.sink.write(level, &line);
    }

    /// Forward a record produced by another process. The text is already
    /// rendered, so it is written as is.
    pub fn relay(&self, record: &LogRecord) {
        let level = match record.kind {
            RecordKind::Error => Level::Error,
            RecordKind::Log => Level::Info,
        };
        self.sink.write(level, &record.text);
    }

    fn render(&self, level: Level, label: &str, message: &str) -> String {
        let color = self.settings.use_color();
        let label = label.to_uppercase();
        let mut parts = Vec::with_capacity(3);

        if let Some(name) = &self.name {
            let name = name.to_uppercase();
            if color {
                parts.push(format!("{}{}{}", "[".dimmed(), name, "]".dimmed()));
            } else {
                parts.push(format!("[{name}]"));
            }
        }

        if color {
            parts.push(paint(level, &label));
            // Info and success payloads keep their own styling.
            if matches!(level, Level::Warn | Level::Error) {
                parts.push(paint(level, message));
            } else {
                parts.push(message.to_string());
            }
        } else {
            parts.push(label);
            parts.push(message.to_string());
        }

        parts.join(" ")
    }
}

fn paint(level: Level, text: &str) -> String {
    match level {
        Level::Info => text.blue().to_string(),
        Level::Success => text.green().to_string(),
        Level::Warn => text.yellow().to_string(),
        Level::Error => text.red().to_string(),
    }
}
