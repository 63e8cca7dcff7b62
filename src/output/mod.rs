//! User-facing execution results and the sink observer interface.

mod console;
mod json;

pub use console::ConsoleSink;
pub use json::JsonLinesSink;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::Result;
use crate::expr::Value;

/// What a caller (and every sink) sees for one POC execution.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Output {
    pub success: bool,
    pub message: String,
    pub data: BTreeMap<String, Value>,
}

impl Output {
    pub fn success(data: BTreeMap<String, Value>) -> Self {
        Self {
            success: true,
            message: "POC executed successfully".to_string(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: BTreeMap::new(),
        }
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.success {
            write!(
                f,
                "[+] Success: {}\nData: {}",
                self.message,
                Value::Map(self.data.clone()).canonical_string()
            )
        } else {
            write!(f, "[-] Failed: {}", self.message)
        }
    }
}

/// Observer that receives every execution result.
///
/// Sinks are best-effort: the controller logs and swallows their errors,
/// so a broken report file never changes a verdict.
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn handle(&self, output: &Output) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_success() {
        let mut data = BTreeMap::new();
        data.insert("token".to_string(), Value::Str("abc".into()));
        let output = Output::success(data);
        let text = output.to_string();
        assert!(text.starts_with("[+] Success: POC executed successfully"));
        assert!(text.contains("token: abc"));
    }

    #[test]
    fn test_display_failure() {
        let output = Output::failure("target is not vulnerable");
        assert_eq!(output.to_string(), "[-] Failed: target is not vulnerable");
    }
}
