use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{PoxideError, Result};

use super::{
    decode_hex, Condition, Extractor, ExtractorKind, Info, Matcher, MatcherKind, Method, Part,
    RequestDef, Severity, Template,
};

/// Accept a scalar where the schema wants a list (`status: 200` and
/// `status: [200]` are both valid on the wire).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

// Stage-one structs are deliberately permissive: every schema decision
// that needs a useful document path in its error is made in stage two.

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    info: Option<RawInfo>,
    #[serde(default)]
    variables: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default)]
    requests: Option<Vec<RawRequest>>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    reference: Option<OneOrMany<String>>,
    #[serde(default)]
    tags: Option<OneOrMany<String>>,
    #[serde(default)]
    remediation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    matchers: Option<Vec<RawMatcher>>,
    #[serde(default)]
    extractors: Option<Vec<RawExtractor>>,
    #[serde(default)]
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMatcher {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    part: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    negative: bool,
    #[serde(default)]
    status: Option<OneOrMany<i64>>,
    #[serde(default)]
    words: Option<OneOrMany<String>>,
    #[serde(default)]
    regex: Option<OneOrMany<String>>,
    #[serde(default)]
    size: Option<OneOrMany<i64>>,
    #[serde(default)]
    binary: Option<OneOrMany<String>>,
}

#[derive(Debug, Deserialize)]
struct RawExtractor {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    part: Option<String>,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    regex: Option<OneOrMany<String>>,
    #[serde(default)]
    group: Option<usize>,
    #[serde(default)]
    kval: Option<OneOrMany<String>>,
    #[serde(default)]
    json: Option<OneOrMany<String>>,
    #[serde(default)]
    xpath: Option<OneOrMany<String>>,
}

fn schema_err(path: impl Into<String>, reason: impl Into<String>) -> PoxideError {
    PoxideError::Parse {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Parse and validate a POC template from YAML text.
///
/// Expressions inside `{{…}}` are *not* compiled here; interpolation is
/// lazy at execution time so templates stay hot-reloadable.
pub fn parse(text: &str) -> Result<Template> {
    let raw: RawTemplate = serde_yaml::from_str(text).map_err(|e| PoxideError::Parse {
        path: "document".to_string(),
        reason: e.to_string(),
    })?;

    let info = normalize_info(raw.info.ok_or_else(|| schema_err("info", "missing required section"))?)?;

    let variables = match raw.variables {
        None => BTreeMap::new(),
        Some(raw_vars) => {
            let mut vars = BTreeMap::new();
            for (name, value) in raw_vars {
                let literal = scalar_to_string(&value).ok_or_else(|| {
                    schema_err(
                        format!("variables.{name}"),
                        "variable values must be scalar strings",
                    )
                })?;
                vars.insert(name, literal);
            }
            vars
        }
    };

    let raw_requests = raw
        .requests
        .ok_or_else(|| schema_err("requests", "missing required section"))?;
    if raw_requests.is_empty() {
        return Err(schema_err("requests", "a template must declare at least one request"));
    }

    let mut requests = Vec::with_capacity(raw_requests.len());
    for (i, raw_request) in raw_requests.into_iter().enumerate() {
        requests.push(normalize_request(raw_request, i)?);
    }

    Ok(Template {
        id: raw.id,
        info,
        variables,
        requests,
    })
}

/// Parse a template from a YAML file.
pub fn parse_file(path: &Path) -> Result<Template> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn normalize_info(raw: RawInfo) -> Result<Info> {
    let name = raw.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(schema_err("info.name", "missing required field"));
    }

    let severity = match raw.severity.as_deref() {
        None | Some("") => Severity::default(),
        Some(s) => parse_severity(s).ok_or_else(|| {
            schema_err(
                "info.severity",
                format!("unknown severity '{s}' (expected info, low, medium, high or critical)"),
            )
        })?,
    };

    Ok(Info {
        name,
        author: raw.author.unwrap_or_default(),
        severity,
        description: raw.description.unwrap_or_default(),
        reference: raw.reference.map(OneOrMany::into_vec).unwrap_or_default(),
        tags: raw.tags.map(OneOrMany::into_vec).unwrap_or_default(),
        remediation: raw.remediation.unwrap_or_default(),
    })
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        "info" => Some(Severity::Info),
        _ => None,
    }
}

fn parse_method(s: &str) -> Option<Method> {
    match s.to_uppercase().as_str() {
        "GET" => Some(Method::Get),
        "POST" => Some(Method::Post),
        "PUT" => Some(Method::Put),
        "DELETE" => Some(Method::Delete),
        _ => None,
    }
}

fn parse_part(s: &str, path: &str) -> Result<Part> {
    match s.to_lowercase().as_str() {
        "" | "body" => Ok(Part::Body),
        "header" => Ok(Part::Header),
        "all" => Ok(Part::All),
        other => Err(schema_err(
            path,
            format!("unknown part '{other}' (expected body, header or all)"),
        )),
    }
}

fn parse_condition(s: &str, path: &str) -> Result<Condition> {
    match s.to_lowercase().as_str() {
        "" | "and" => Ok(Condition::And),
        "or" => Ok(Condition::Or),
        other => Err(schema_err(
            path,
            format!("unknown condition '{other}' (expected and or or)"),
        )),
    }
}

fn normalize_request(raw: RawRequest, index: usize) -> Result<RequestDef> {
    let base = format!("requests[{index}]");

    let method_text = raw
        .method
        .ok_or_else(|| schema_err(format!("{base}.method"), "missing required field"))?;
    let method = parse_method(&method_text).ok_or_else(|| {
        schema_err(
            format!("{base}.method"),
            format!("unknown method '{method_text}' (expected GET, POST, PUT or DELETE)"),
        )
    })?;

    let path = raw
        .path
        .ok_or_else(|| schema_err(format!("{base}.path"), "missing required field"))?;

    let condition = match raw.condition.as_deref() {
        None => Condition::default(),
        Some(s) => parse_condition(s, &format!("{base}.condition"))?,
    };

    let mut matchers = Vec::new();
    for (i, raw_matcher) in raw.matchers.unwrap_or_default().into_iter().enumerate() {
        matchers.push(normalize_matcher(raw_matcher, &format!("{base}.matchers[{i}]"))?);
    }

    let mut extractors = Vec::new();
    for (i, raw_extractor) in raw.extractors.unwrap_or_default().into_iter().enumerate() {
        extractors.push(normalize_extractor(
            raw_extractor,
            &format!("{base}.extractors[{i}]"),
        )?);
    }

    Ok(RequestDef {
        method,
        path,
        headers: raw.headers.unwrap_or_default(),
        body: raw.body,
        matchers,
        extractors,
        condition,
    })
}

fn int_list_to_u16(values: Vec<i64>, path: &str) -> Result<Vec<u16>> {
    values
        .into_iter()
        .map(|n| {
            u16::try_from(n)
                .map_err(|_| schema_err(path, format!("status code {n} out of range")))
        })
        .collect()
}

fn int_list_to_u64(values: Vec<i64>, path: &str) -> Result<Vec<u64>> {
    values
        .into_iter()
        .map(|n| {
            u64::try_from(n).map_err(|_| schema_err(path, format!("size {n} must not be negative")))
        })
        .collect()
}

fn normalize_matcher(raw: RawMatcher, path: &str) -> Result<Matcher> {
    let kind_text = raw
        .kind
        .ok_or_else(|| schema_err(format!("{path}.type"), "missing required field"))?;

    let kind = match kind_text.to_lowercase().as_str() {
        "status" => {
            let status = raw
                .status
                .ok_or_else(|| schema_err(format!("{path}.status"), "status matcher requires a status list"))?;
            MatcherKind::Status {
                status: int_list_to_u16(status.into_vec(), &format!("{path}.status"))?,
            }
        }
        "word" => {
            let words = raw
                .words
                .ok_or_else(|| schema_err(format!("{path}.words"), "word matcher requires a words list"))?;
            MatcherKind::Word {
                words: words.into_vec(),
            }
        }
        "regex" => {
            let regex = raw
                .regex
                .ok_or_else(|| schema_err(format!("{path}.regex"), "regex matcher requires a regex list"))?;
            MatcherKind::Regex {
                regex: regex.into_vec(),
            }
        }
        "size" => {
            let size = raw
                .size
                .ok_or_else(|| schema_err(format!("{path}.size"), "size matcher requires a size list"))?;
            MatcherKind::Size {
                size: int_list_to_u64(size.into_vec(), &format!("{path}.size"))?,
            }
        }
        "binary" => {
            let binary = raw
                .binary
                .ok_or_else(|| schema_err(format!("{path}.binary"), "binary matcher requires a binary list"))?;
            let mut patterns = Vec::new();
            for (i, hex) in binary.into_vec().into_iter().enumerate() {
                let normalized = hex.trim().to_lowercase();
                if decode_hex(&normalized).is_none() {
                    return Err(schema_err(
                        format!("{path}.binary[{i}]"),
                        format!("'{hex}' is not a valid hex byte sequence"),
                    ));
                }
                patterns.push(normalized);
            }
            MatcherKind::Binary { binary: patterns }
        }
        other => {
            return Err(schema_err(
                format!("{path}.type"),
                format!("unknown matcher type '{other}'"),
            ))
        }
    };

    let part = match raw.part.as_deref() {
        None => Part::default(),
        Some(s) => parse_part(s, &format!("{path}.part"))?,
    };
    let condition = match raw.condition.as_deref() {
        None => Condition::default(),
        Some(s) => parse_condition(s, &format!("{path}.condition"))?,
    };

    Ok(Matcher {
        kind,
        part,
        condition,
        negative: raw.negative,
    })
}

fn normalize_extractor(raw: RawExtractor, path: &str) -> Result<Extractor> {
    let kind_text = raw
        .kind
        .ok_or_else(|| schema_err(format!("{path}.type"), "missing required field"))?;

    let mut part = match raw.part.as_deref() {
        None => Part::default(),
        Some(s) => parse_part(s, &format!("{path}.part"))?,
    };

    let kind = match kind_text.to_lowercase().as_str() {
        "regex" => {
            let regex = raw
                .regex
                .ok_or_else(|| schema_err(format!("{path}.regex"), "regex extractor requires a regex list"))?;
            ExtractorKind::Regex {
                regex: regex.into_vec(),
                group: raw.group,
            }
        }
        "kval" => {
            let kval = raw
                .kval
                .ok_or_else(|| schema_err(format!("{path}.kval"), "kval extractor requires a key list"))?;
            // kval always reads headers regardless of the declared part.
            part = Part::Header;
            ExtractorKind::Kval {
                kval: kval.into_vec(),
            }
        }
        "json" => {
            let json = raw
                .json
                .ok_or_else(|| schema_err(format!("{path}.json"), "json extractor requires a path list"))?;
            ExtractorKind::Json {
                json: json.into_vec(),
            }
        }
        "xpath" => {
            let xpath = raw
                .xpath
                .ok_or_else(|| schema_err(format!("{path}.xpath"), "xpath extractor requires a path list"))?;
            ExtractorKind::Xpath {
                xpath: xpath.into_vec(),
            }
        }
        other => {
            return Err(schema_err(
                format!("{path}.type"),
                format!("unknown extractor type '{other}'"),
            ))
        }
    };

    Ok(Extractor {
        kind,
        name: raw.name.unwrap_or_default(),
        part,
        internal: raw.internal,
    })
}
