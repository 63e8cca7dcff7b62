use crate::errors::{ExprError, ExprErrorKind};
use crate::expr::{Environment, Evaluator};

/// Expand every `{{ expression }}` in `input` against the environment.
///
/// The scan is linear and non-overlapping: after a splice it resumes past
/// the substituted text, so values containing `{{` are never re-expanded.
/// Nested `{{` inside a placeholder and an unmatched `{{` are both parse
/// errors rather than silent truncation.
pub fn interpolate(
    input: &str,
    env: &Environment,
    evaluator: &Evaluator,
) -> Result<String, ExprError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let abs_open = offset + open;

        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| {
            ExprError::new(
                abs_open,
                ExprErrorKind::Parse,
                "unmatched '{{' in template string",
            )
        })?;

        let inner = &after_open[..close];
        if inner.contains("{{") {
            return Err(ExprError::new(
                abs_open,
                ExprErrorKind::Parse,
                "nested '{{' is not supported",
            ));
        }
        if inner.trim().is_empty() {
            return Err(ExprError::new(
                abs_open,
                ExprErrorKind::Parse,
                "empty template expression",
            ));
        }

        let value = evaluator.eval(inner, env).map_err(|mut err| {
            // Token offsets come back relative to the inner expression.
            err.position += abs_open + 2;
            err
        })?;
        out.push_str(&value.canonical_string());

        rest = &after_open[close + 2..];
        offset = abs_open + 2 + close + 2;
    }

    out.push_str(rest);
    Ok(out)
}
