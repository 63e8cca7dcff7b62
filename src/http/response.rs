use std::collections::BTreeMap;
use std::time::Duration;

use crate::expr::Value;

/// Normalized HTTP response handed to matchers and extractors.
///
/// Header values are first-wins for duplicate names. `body` keeps the raw
/// bytes for size/binary matching; `body_text` is the lossy UTF-8 view
/// everything string-oriented works against.
#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub body_text: String,
    pub cookies: BTreeMap<String, String>,
    pub elapsed: Duration,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers as an environment value.
    pub fn headers_value(&self) -> Value {
        Value::Map(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                .collect(),
        )
    }

    /// The full response record as an environment value, bound under
    /// `response` after each request in the chain.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("status_code".to_string(), Value::Int(self.status_code as i64));
        map.insert("body".to_string(), Value::Str(self.body_text.clone()));
        map.insert("headers".to_string(), self.headers_value());
        map.insert(
            "cookies".to_string(),
            Value::Map(
                self.cookies
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                    .collect(),
            ),
        );
        map.insert(
            "elapsed_ms".to_string(),
            Value::Int(self.elapsed.as_millis() as i64),
        );
        Value::Map(map)
    }
}
