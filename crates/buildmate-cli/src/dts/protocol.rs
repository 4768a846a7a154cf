//! Messages exchanged with the declaration worker, one JSON value per line.

use buildmate_bundler::{LogRecord, WorkerOptions};
use serde::{Deserialize, Serialize};

/// The single message the worker reads from stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    /// Display name of the target, used as the log prefix.
    pub config_name: Option<String>,
    pub options: WorkerOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// What the worker writes to stdout: a bare status token or a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Status(Status),
    Record(LogRecord),
}

impl WorkerReply {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildmate_bundler::logger::RecordKind;

    #[test]
    fn status_tokens_are_bare_strings() {
        assert_eq!(WorkerReply::Status(Status::Success).to_line().unwrap(), "\"success\"");
        assert_eq!(
            WorkerReply::from_line("\"error\"\n").unwrap(),
            WorkerReply::Status(Status::Error)
        );
    }

    #[test]
    fn log_records_keep_their_type_field() {
        let reply = WorkerReply::from_line(r#"{"type":"error","text":"[DTS] Build error"}"#).unwrap();
        assert_eq!(
            reply,
            WorkerReply::Record(LogRecord {
                kind: RecordKind::Error,
                text: "[DTS] Build error".into(),
            })
        );
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(WorkerReply::from_line("\"done\"").is_err());
    }
}
