use crate::errors::{ExprError, ExprErrorKind};

use super::env::Environment;
use super::eval::Evaluator;
use super::value::Value;

// Positions on errors raised here are rewritten to the call site by the
// evaluator, so builtins report offset 0.

fn arity(name: &str, expected: usize, got: usize) -> ExprError {
    ExprError::new(
        0,
        ExprErrorKind::ArityMismatch,
        format!("{name} expects {expected} argument(s), got {got}"),
    )
}

fn want_str<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, ExprError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(ExprError::new(
            0,
            ExprErrorKind::TypeMismatch,
            format!(
                "{name} expects a string for argument {}, got {}",
                index + 1,
                other.type_name()
            ),
        )),
        None => Err(arity(name, index + 1, args.len())),
    }
}

fn want_int(name: &str, args: &[Value], index: usize) -> Result<i64, ExprError> {
    match args.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(ExprError::new(
            0,
            ExprErrorKind::TypeMismatch,
            format!(
                "{name} expects an int for argument {}, got {}",
                index + 1,
                other.type_name()
            ),
        )),
        None => Err(arity(name, index + 1, args.len())),
    }
}

pub fn register_builtins(evaluator: &mut Evaluator) {
    evaluator.register(
        "contains",
        Box::new(|_env, args| {
            if args.len() != 2 {
                return Err(arity("contains", 2, args.len()));
            }
            let s = want_str("contains", args, 0)?;
            let sub = want_str("contains", args, 1)?;
            Ok(Value::Bool(s.contains(sub)))
        }),
    );

    evaluator.register(
        "hasPrefix",
        Box::new(|_env, args| {
            if args.len() != 2 {
                return Err(arity("hasPrefix", 2, args.len()));
            }
            let s = want_str("hasPrefix", args, 0)?;
            let prefix = want_str("hasPrefix", args, 1)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }),
    );

    evaluator.register(
        "hasSuffix",
        Box::new(|_env, args| {
            if args.len() != 2 {
                return Err(arity("hasSuffix", 2, args.len()));
            }
            let s = want_str("hasSuffix", args, 0)?;
            let suffix = want_str("hasSuffix", args, 1)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }),
    );

    evaluator.register(
        "toLower",
        Box::new(|_env, args| {
            if args.len() != 1 {
                return Err(arity("toLower", 1, args.len()));
            }
            Ok(Value::Str(want_str("toLower", args, 0)?.to_lowercase()))
        }),
    );

    evaluator.register(
        "toUpper",
        Box::new(|_env, args| {
            if args.len() != 1 {
                return Err(arity("toUpper", 1, args.len()));
            }
            Ok(Value::Str(want_str("toUpper", args, 0)?.to_uppercase()))
        }),
    );

    evaluator.register(
        "len",
        Box::new(|_env, args| {
            if args.len() != 1 {
                return Err(arity("len", 1, args.len()));
            }
            let n = match &args[0] {
                Value::Str(s) => s.len(),
                Value::Bytes(b) => b.len(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(ExprError::new(
                        0,
                        ExprErrorKind::TypeMismatch,
                        format!("len is not defined for {}", other.type_name()),
                    ))
                }
            };
            Ok(Value::Int(n as i64))
        }),
    );

    // substr operates on characters, not bytes, so multi-byte responses
    // cannot split a code point. Out-of-range indices clamp.
    evaluator.register(
        "substr",
        Box::new(|_env, args| {
            if args.len() != 3 {
                return Err(arity("substr", 3, args.len()));
            }
            let s = want_str("substr", args, 0)?;
            let start = want_int("substr", args, 1)?.max(0) as usize;
            let end = want_int("substr", args, 2)?.max(0) as usize;
            if end <= start {
                return Ok(Value::Str(String::new()));
            }
            let out: String = s.chars().skip(start).take(end - start).collect();
            Ok(Value::Str(out))
        }),
    );

    evaluator.register(
        "match",
        Box::new(|_env, args| {
            if args.len() != 2 {
                return Err(arity("match", 2, args.len()));
            }
            let pattern = want_str("match", args, 0)?;
            let s = want_str("match", args, 1)?;
            let glob = glob::Pattern::new(pattern).map_err(|e| {
                ExprError::new(
                    0,
                    ExprErrorKind::Parse,
                    format!("invalid glob pattern '{pattern}': {e}"),
                )
            })?;
            Ok(Value::Bool(glob.matches(s)))
        }),
    );

    evaluator.register(
        "status",
        Box::new(|env, args| {
            if !args.is_empty() {
                return Err(arity("status", 0, args.len()));
            }
            env.get("status_code").cloned().ok_or_else(|| {
                ExprError::new(
                    0,
                    ExprErrorKind::UndefinedName,
                    "status() called before any response was received",
                )
            })
        }),
    );

    evaluator.register(
        "body",
        Box::new(|env, args| {
            if !args.is_empty() {
                return Err(arity("body", 0, args.len()));
            }
            env.get("body").cloned().ok_or_else(|| {
                ExprError::new(
                    0,
                    ExprErrorKind::UndefinedName,
                    "body() called before any response was received",
                )
            })
        }),
    );

    // Missing headers resolve to the empty string so templates can probe
    // optional headers without guarding.
    evaluator.register(
        "header",
        Box::new(|env, args| {
            if args.len() != 1 {
                return Err(arity("header", 1, args.len()));
            }
            let name = want_str("header", args, 0)?;
            let headers = env.get("headers").ok_or_else(|| {
                ExprError::new(
                    0,
                    ExprErrorKind::UndefinedName,
                    "header() called before any response was received",
                )
            })?;
            match headers {
                Value::Map(entries) => {
                    let value = entries
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| Value::Str(String::new()));
                    Ok(value)
                }
                other => Err(ExprError::new(
                    0,
                    ExprErrorKind::TypeMismatch,
                    format!("headers binding is {}, expected map", other.type_name()),
                )),
            }
        }),
    );

    evaluator.register(
        "responseTime",
        Box::new(|env, args| {
            if !args.is_empty() {
                return Err(arity("responseTime", 0, args.len()));
            }
            let response = env.get("response").ok_or_else(|| {
                ExprError::new(
                    0,
                    ExprErrorKind::UndefinedName,
                    "responseTime() called before any response was received",
                )
            })?;
            match response {
                Value::Map(entries) => Ok(entries
                    .get("elapsed_ms")
                    .cloned()
                    .unwrap_or(Value::Int(0))),
                other => Err(ExprError::new(
                    0,
                    ExprErrorKind::TypeMismatch,
                    format!("response binding is {}, expected map", other.type_name()),
                )),
            }
        }),
    );
}
