use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::errors::{PoxideError, Result};

use super::{Output, ResultSink};

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    #[serde(flatten)]
    output: &'a Output,
}

/// Appends one JSON object per result to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

impl ResultSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn init(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        *self.file.lock().unwrap() = Some(file);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if let Some(file) = self.file.lock().unwrap().as_mut() {
            file.flush()?;
        }
        *self.file.lock().unwrap() = None;
        Ok(())
    }

    fn handle(&self, output: &Output) -> Result<()> {
        let record = Record {
            timestamp: Utc::now().to_rfc3339(),
            output,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| PoxideError::Sink(format!("serialize result: {e}")))?;

        let mut guard = self.file.lock().unwrap();
        let file = guard
            .as_mut()
            .ok_or_else(|| PoxideError::Sink("jsonl sink used before init".to_string()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use std::collections::BTreeMap;

    #[test]
    fn test_writes_one_line_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let sink = JsonLinesSink::new(&path);
        sink.init().unwrap();

        let mut data = BTreeMap::new();
        data.insert("token".to_string(), Value::Str("abc".into()));
        sink.handle(&Output::success(data)).unwrap();
        sink.handle(&Output::failure("target is not vulnerable")).unwrap();
        sink.stop().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["success"], serde_json::Value::Bool(true));
        assert_eq!(first["data"]["token"], "abc");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["success"], serde_json::Value::Bool(false));
    }

    #[test]
    fn test_handle_before_init_errors() {
        let sink = JsonLinesSink::new("/tmp/unused.jsonl");
        let err = sink.handle(&Output::failure("x")).unwrap_err();
        assert!(matches!(err, PoxideError::Sink(_)));
    }
}
