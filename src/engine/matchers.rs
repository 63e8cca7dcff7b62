use regex::Regex;

use crate::errors::{PoxideError, Result};
use crate::http::Response;
use crate::template::{decode_hex, Condition, Matcher, MatcherKind, Part};

/// Combine a request's matchers under its condition.
///
/// An empty matcher list always passes: the request is then a pure
/// extractor step.
pub fn evaluate_matchers(
    matchers: &[Matcher],
    condition: Condition,
    response: &Response,
) -> Result<bool> {
    if matchers.is_empty() {
        return Ok(true);
    }
    match condition {
        Condition::And => {
            for matcher in matchers {
                if !evaluate_matcher(matcher, response)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or => {
            for matcher in matchers {
                if evaluate_matcher(matcher, response)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// A single matcher's verdict, `negative` applied.
pub fn evaluate_matcher(matcher: &Matcher, response: &Response) -> Result<bool> {
    let hit = match &matcher.kind {
        MatcherKind::Status { status } => status.contains(&response.status_code),
        MatcherKind::Word { words } => {
            combine(matcher.condition, words.iter(), |word| {
                Ok(part_contains(response, matcher.part, word))
            })?
        }
        MatcherKind::Regex { regex } => {
            combine(matcher.condition, regex.iter(), |pattern| {
                let re = Regex::new(pattern)
                    .map_err(|e| PoxideError::InvalidRegex(format!("{pattern}: {e}")))?;
                Ok(part_matches(response, matcher.part, &re))
            })?
        }
        MatcherKind::Size { size } => size.contains(&(response.body.len() as u64)),
        MatcherKind::Binary { binary } => {
            combine(matcher.condition, binary.iter(), |hex| {
                let needle = decode_hex(hex).unwrap_or_default();
                Ok(contains_bytes(&response.body, &needle))
            })?
        }
    };
    Ok(hit != matcher.negative)
}

fn combine<'a, I, F>(condition: Condition, patterns: I, mut hit: F) -> Result<bool>
where
    I: Iterator<Item = &'a String>,
    F: FnMut(&str) -> Result<bool>,
{
    match condition {
        Condition::And => {
            for pattern in patterns {
                if !hit(pattern)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or => {
            for pattern in patterns {
                if hit(pattern)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Case-sensitive literal containment in the selected response part. For
/// `header`, a word must sit inside a single header value; it never spans
/// the boundary between two values.
fn part_contains(response: &Response, part: Part, word: &str) -> bool {
    match part {
        Part::Body => response.body_text.contains(word),
        Part::Header => response.headers.values().any(|v| v.contains(word)),
        Part::All => {
            response.body_text.contains(word)
                || response.headers.values().any(|v| v.contains(word))
        }
    }
}

fn part_matches(response: &Response, part: Part, re: &Regex) -> bool {
    match part {
        Part::Body => re.is_match(&response.body_text),
        Part::Header => response.headers.values().any(|v| re.is_match(v)),
        Part::All => {
            re.is_match(&response.body_text) || response.headers.values().any(|v| re.is_match(v))
        }
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn make_response(status: u16, body: &[u8]) -> Response {
        Response {
            status_code: status,
            headers: BTreeMap::new(),
            body: body.to_vec(),
            body_text: String::from_utf8_lossy(body).into_owned(),
            cookies: BTreeMap::new(),
            elapsed: Duration::from_millis(1),
        }
    }

    fn word_matcher(words: &[&str], part: Part, condition: Condition, negative: bool) -> Matcher {
        Matcher {
            kind: MatcherKind::Word {
                words: words.iter().map(|s| s.to_string()).collect(),
            },
            part,
            condition,
            negative,
        }
    }

    #[test]
    fn test_status_matcher() {
        let matcher = Matcher {
            kind: MatcherKind::Status { status: vec![200, 302] },
            part: Part::Body,
            condition: Condition::And,
            negative: false,
        };
        assert!(evaluate_matcher(&matcher, &make_response(302, b"")).unwrap());
        assert!(!evaluate_matcher(&matcher, &make_response(404, b"")).unwrap());
    }

    #[test]
    fn test_empty_status_list_never_matches() {
        let matcher = Matcher {
            kind: MatcherKind::Status { status: vec![] },
            part: Part::Body,
            condition: Condition::And,
            negative: false,
        };
        assert!(!evaluate_matcher(&matcher, &make_response(200, b"")).unwrap());
    }

    #[test]
    fn test_word_matcher_or_and() {
        let response = make_response(200, b"Welcome back, admin");
        let any = word_matcher(&["nope", "admin"], Part::Body, Condition::Or, false);
        assert!(evaluate_matcher(&any, &response).unwrap());
        let all = word_matcher(&["Welcome", "admin"], Part::Body, Condition::And, false);
        assert!(evaluate_matcher(&all, &response).unwrap());
        let all_miss = word_matcher(&["Welcome", "root"], Part::Body, Condition::And, false);
        assert!(!evaluate_matcher(&all_miss, &response).unwrap());
    }

    #[test]
    fn test_word_matcher_is_case_sensitive() {
        let response = make_response(200, b"ADMIN");
        let matcher = word_matcher(&["admin"], Part::Body, Condition::Or, false);
        assert!(!evaluate_matcher(&matcher, &response).unwrap());
    }

    #[test]
    fn test_word_matcher_header_part() {
        let mut response = make_response(200, b"nothing here");
        response
            .headers
            .insert("Server".to_string(), "Apache/2.4.41".to_string());
        let matcher = word_matcher(&["Apache"], Part::Header, Condition::Or, false);
        assert!(evaluate_matcher(&matcher, &response).unwrap());
        let body_only = word_matcher(&["Apache"], Part::Body, Condition::Or, false);
        assert!(!evaluate_matcher(&body_only, &response).unwrap());
        let all = word_matcher(&["Apache"], Part::All, Condition::Or, false);
        assert!(evaluate_matcher(&all, &response).unwrap());
    }

    #[test]
    fn test_negative_is_exact_negation() {
        let response = make_response(200, b"FORBIDDEN");
        for words in [&["FORBIDDEN"][..], &["OK"][..]] {
            let plain = word_matcher(words, Part::Body, Condition::Or, false);
            let negated = word_matcher(words, Part::Body, Condition::Or, true);
            assert_eq!(
                evaluate_matcher(&plain, &response).unwrap(),
                !evaluate_matcher(&negated, &response).unwrap()
            );
        }
    }

    #[test]
    fn test_regex_matcher() {
        let response = make_response(200, b"version 2.14.1 ready");
        let matcher = Matcher {
            kind: MatcherKind::Regex {
                regex: vec![r"version \d+\.\d+\.\d+".to_string()],
            },
            part: Part::Body,
            condition: Condition::Or,
            negative: false,
        };
        assert!(evaluate_matcher(&matcher, &response).unwrap());
    }

    #[test]
    fn test_invalid_regex_aborts() {
        let matcher = Matcher {
            kind: MatcherKind::Regex {
                regex: vec!["[unclosed".to_string()],
            },
            part: Part::Body,
            condition: Condition::Or,
            negative: false,
        };
        let err = evaluate_matcher(&matcher, &make_response(200, b"")).unwrap_err();
        assert!(matches!(err, PoxideError::InvalidRegex(_)));
    }

    #[test]
    fn test_size_matcher_uses_byte_length() {
        // 'é' is one char but two bytes
        let response = make_response(200, "é".as_bytes());
        let matcher = Matcher {
            kind: MatcherKind::Size { size: vec![2] },
            part: Part::Body,
            condition: Condition::And,
            negative: false,
        };
        assert!(evaluate_matcher(&matcher, &response).unwrap());
    }

    #[test]
    fn test_size_zero_matches_empty_body() {
        let matcher = Matcher {
            kind: MatcherKind::Size { size: vec![0] },
            part: Part::Body,
            condition: Condition::And,
            negative: false,
        };
        assert!(evaluate_matcher(&matcher, &make_response(204, b"")).unwrap());
    }

    #[test]
    fn test_binary_matcher() {
        let response = make_response(200, &[0x89, b'P', b'N', b'G', 0x0d, 0x0a]);
        let matcher = Matcher {
            kind: MatcherKind::Binary {
                binary: vec!["89504e47".to_string()],
            },
            part: Part::Body,
            condition: Condition::Or,
            negative: false,
        };
        assert!(evaluate_matcher(&matcher, &response).unwrap());
    }

    #[test]
    fn test_empty_matcher_list_passes() {
        let response = make_response(500, b"");
        assert!(evaluate_matchers(&[], Condition::And, &response).unwrap());
        assert!(evaluate_matchers(&[], Condition::Or, &response).unwrap());
    }

    #[test]
    fn test_request_condition_aggregation() {
        let response = make_response(200, b"Welcome");
        let status_hit = Matcher {
            kind: MatcherKind::Status { status: vec![200] },
            part: Part::Body,
            condition: Condition::And,
            negative: false,
        };
        let word_miss = word_matcher(&["nope"], Part::Body, Condition::Or, false);

        let both = vec![status_hit.clone(), word_miss.clone()];
        assert!(!evaluate_matchers(&both, Condition::And, &response).unwrap());
        assert!(evaluate_matchers(&both, Condition::Or, &response).unwrap());
    }
}
