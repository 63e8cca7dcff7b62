//! The POC template model: pure data describing a chain of HTTP probes
//! with per-request matchers and extractors.
//!
//! Parsing and normalization live in [`parser`]; `{{…}}` interpolation in
//! [`interpolate`]. The model derives `Serialize` so its semantic content
//! round-trips through YAML independent of the original formatting.

pub mod interpolate;
pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use parser::{parse, parse_file};

/// Severity of the vulnerability a template probes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Info,
}

impl Severity {
    /// Numeric rank, lower is more severe. Critical = 0 … Info = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Info {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remediation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How several matchers (or words/patterns within one matcher) combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    And,
    Or,
}

/// Which slice of the response a matcher or extractor inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    #[default]
    Body,
    Header,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatcherKind {
    Status { status: Vec<u16> },
    Word { words: Vec<String> },
    Regex { regex: Vec<String> },
    Size { size: Vec<u64> },
    /// Hex-encoded byte sequences, validated and lowercased at parse time.
    Binary { binary: Vec<String> },
}

/// Predicate over a response. `negative` flips the final boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(flatten)]
    pub kind: MatcherKind,
    #[serde(default)]
    pub part: Part,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub negative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExtractorKind {
    Regex {
        regex: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<usize>,
    },
    Kval {
        kval: Vec<String>,
    },
    Json {
        json: Vec<String>,
    },
    Xpath {
        xpath: Vec<String>,
    },
}

/// Pulls a named value out of a response into the environment.
///
/// `internal` extractors feed later requests but are excluded from the
/// user-visible evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extractor {
    #[serde(flatten)]
    pub kind: ExtractorKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub part: Part,
    #[serde(default)]
    pub internal: bool,
}

/// One probe in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDef {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,
    #[serde(default)]
    pub condition: Condition,
}

/// A validated POC template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub info: Info,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    pub requests: Vec<RequestDef>,
}

impl Template {
    /// Serialize the semantic model back to YAML.
    pub fn to_yaml(&self) -> crate::errors::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Decode a hex string into bytes. Parse-time validation guarantees this
/// succeeds for stored binary matcher patterns.
pub fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let raw = hex.as_bytes();
    for pair in raw.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        bytes.push(((hi << 4) | lo) as u8);
    }
    Some(bytes)
}
