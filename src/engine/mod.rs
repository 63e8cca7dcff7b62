//! The execution engine: runs a template's request chain against one
//! target, threading extracted values through the evaluation environment.
//!
//! A single execution is strictly sequential; request `i + 1` only starts
//! after request `i`'s response has been matched and its extractors
//! applied. Parallelism lives above this layer, across (template, target)
//! pairs.

mod extractors;
mod matchers;

pub use extractors::evaluate_extractor;
pub use matchers::{evaluate_matcher, evaluate_matchers};

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::PoxideError;
use crate::expr::{Environment, Evaluator, Value};
use crate::http::{HttpClient, RequestSpec};
use crate::template::{interpolate::interpolate, RequestDef, Template};

/// Result of one template execution.
///
/// Transport, expression and runtime schema failures land in
/// `last_error` with `matched = false`; a matcher miss is a clean
/// negative with no error.
#[derive(Debug, Default)]
pub struct Outcome {
    pub matched: bool,
    pub extracted: BTreeMap<String, Value>,
    pub requests_issued: usize,
    pub last_error: Option<PoxideError>,
}

#[derive(Clone)]
pub struct Engine {
    client: HttpClient,
    evaluator: Arc<Evaluator>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            evaluator: Arc::new(Evaluator::new()),
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Run the full request chain. The environment starts from the
    /// target, the caller's options (this is how `oast_domain` /
    /// `oast_url` ride in) and the template's literal variables.
    pub async fn execute(
        &self,
        template: &Template,
        target: &str,
        options: &BTreeMap<String, Value>,
    ) -> Outcome {
        let mut env = Environment::new();
        env.set("target", Value::Str(target.to_string()));
        for (key, value) in options {
            env.set(key.clone(), value.clone());
        }
        for (name, literal) in &template.variables {
            env.set(name.clone(), Value::Str(literal.clone()));
        }

        let mut outcome = Outcome::default();

        for (index, request) in template.requests.iter().enumerate() {
            let spec = match self.build_spec(request, target, &env) {
                Ok(spec) => spec,
                Err(err) => {
                    warn!(template = %template.info.name, request = index, error = %err,
                        "Request interpolation failed");
                    outcome.last_error = Some(err);
                    return outcome;
                }
            };

            outcome.requests_issued += 1;
            let response = match self.client.execute(&spec).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(template = %template.info.name, request = index, error = %err,
                        "Transport failure, aborting chain");
                    outcome.last_error = Some(err.into());
                    return outcome;
                }
            };

            env.set("response", response.to_value());
            env.set("status_code", Value::Int(response.status_code as i64));
            env.set("body", Value::Str(response.body_text.clone()));
            env.set("headers", response.headers_value());

            match evaluate_matchers(&request.matchers, request.condition, &response) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(template = %template.info.name, request = index, "Matchers did not hit");
                    return outcome;
                }
                Err(err) => {
                    outcome.last_error = Some(err);
                    return outcome;
                }
            }

            for extractor in &request.extractors {
                let value = match evaluate_extractor(extractor, &response) {
                    Ok(value) => value,
                    Err(err) => {
                        outcome.last_error = Some(err);
                        return outcome;
                    }
                };
                if extractor.name.is_empty() {
                    continue;
                }
                env.set(extractor.name.clone(), value.clone());
                if !extractor.internal {
                    outcome.extracted.insert(extractor.name.clone(), value);
                }
            }
        }

        outcome.matched = true;
        outcome
    }

    fn build_spec(
        &self,
        request: &RequestDef,
        target: &str,
        env: &Environment,
    ) -> Result<RequestSpec, PoxideError> {
        let path = interpolate(&request.path, env, &self.evaluator)?;

        let mut headers = BTreeMap::new();
        for (name, value_template) in &request.headers {
            let value = interpolate(value_template, env, &self.evaluator)?;
            headers.insert(name.clone(), value);
        }

        let body = match &request.body {
            Some(template) => Some(interpolate(template, env, &self.evaluator)?),
            None => None,
        };

        let mut spec =
            RequestSpec::new(request.method, join_url(target, &path)).with_verify_tls(false);
        if let Some(Value::Str(proxy)) = env.get("proxy") {
            if !proxy.is_empty() {
                spec = spec.with_proxy(proxy.clone());
            }
        }
        spec.headers = headers;
        spec.body = body;
        Ok(spec)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Join an interpolated request path onto the target base URL.
fn join_url(target: &str, path: &str) -> String {
    if path.is_empty() {
        return target.to_string();
    }
    let base = target.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://t", "/a"), "http://t/a");
        assert_eq!(join_url("http://t/", "/a"), "http://t/a");
        assert_eq!(join_url("http://t", "a"), "http://t/a");
        assert_eq!(join_url("http://t/", ""), "http://t/");
        assert_eq!(join_url("http://t", "/a?b=1"), "http://t/a?b=1");
    }
}
