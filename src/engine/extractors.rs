use std::collections::BTreeMap;

use regex::Regex;

use crate::errors::{PoxideError, Result};
use crate::expr::Value;
use crate::http::Response;
use crate::template::{Extractor, ExtractorKind, Part};

/// Run one extractor against a response.
///
/// Extractors that find nothing produce an empty string (or empty map for
/// `kval`) rather than an error: a missing token is evidence, not a
/// failure of the chain.
pub fn evaluate_extractor(extractor: &Extractor, response: &Response) -> Result<Value> {
    match &extractor.kind {
        ExtractorKind::Regex { regex, group } => {
            extract_regex(regex, *group, extractor.part, response)
        }
        ExtractorKind::Kval { kval } => Ok(extract_kval(kval, response)),
        ExtractorKind::Json { json } => extract_json(json, response),
        ExtractorKind::Xpath { .. } => {
            Err(PoxideError::UnsupportedExtractor("xpath".to_string()))
        }
    }
}

/// First capture group of the first pattern that matches; whole match for
/// patterns without groups; empty string when nothing matches.
fn extract_regex(
    patterns: &[String],
    group: Option<usize>,
    part: Part,
    response: &Response,
) -> Result<Value> {
    let content = part_content(response, part);
    for pattern in patterns {
        let re = Regex::new(pattern)
            .map_err(|e| PoxideError::InvalidRegex(format!("{pattern}: {e}")))?;
        if let Some(captures) = re.captures(&content) {
            let index = group.unwrap_or(1);
            let matched = captures.get(index).or_else(|| captures.get(0));
            if let Some(m) = matched {
                return Ok(Value::Str(m.as_str().to_string()));
            }
        }
    }
    Ok(Value::Str(String::new()))
}

/// Map of requested header names to first-seen values; missing keys are
/// absent from the map, not null.
fn extract_kval(keys: &[String], response: &Response) -> Value {
    let mut out = BTreeMap::new();
    for key in keys {
        if let Some(value) = response.header(key) {
            out.insert(key.clone(), Value::Str(value.to_string()));
        }
    }
    Value::Map(out)
}

/// First path that resolves against the body parsed as JSON; empty string
/// when the body is not JSON or no path resolves.
fn extract_json(paths: &[String], response: &Response) -> Result<Value> {
    let root: serde_json::Value = match serde_json::from_str(&response.body_text) {
        Ok(root) => root,
        Err(_) => return Ok(Value::Str(String::new())),
    };
    for path in paths {
        if let Some(found) = resolve_json_path(&root, path) {
            return Ok(Value::from_json(found));
        }
    }
    Ok(Value::Str(String::new()))
}

/// Dot/bracket path subset: `$.data.items[0].token`, leading `$.`
/// optional. Each dot segment may carry any number of `[n]` indexes.
fn resolve_json_path<'a>(
    root: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);

    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indexes) = split_indexes(segment)?;
        if !key.is_empty() {
            current = current.get(key)?;
        }
        for index in indexes {
            current = current.get(index)?;
        }
    }
    Some(current)
}

/// Split `items[0][1]` into ("items", [0, 1]). Returns None on malformed
/// bracket syntax.
fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(bracket) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let key = &segment[..bracket];
    let mut indexes = Vec::new();
    let mut rest = &segment[bracket..];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indexes.push(inner[..close].parse().ok()?);
        rest = &inner[close + 1..];
    }
    Some((key, indexes))
}

fn part_content(response: &Response, part: Part) -> String {
    match part {
        Part::Body => response.body_text.clone(),
        Part::Header => header_block(response),
        Part::All => format!("{}{}", response.body_text, header_block(response)),
    }
}

fn header_block(response: &Response) -> String {
    let mut out = String::new();
    for (name, value) in &response.headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}
