use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::errors::TransportError;
use crate::template::Method;

use super::response::Response;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

/// One fully resolved HTTP probe.
///
/// Defaults mirror a plain client (TLS verified, redirects followed,
/// 30 s timeout); the execution engine flips `verify_tls` off because POC
/// targets routinely serve self-signed or expired certificates.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub verify_tls: bool,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub follow_redirects: bool,
    /// Requests sharing a session id reuse one cookie jar; stateless
    /// without one.
    pub session: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            verify_tls: true,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            follow_redirects: true,
            session: None,
        }
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// Thread-safe HTTP client shared across template executions.
///
/// Session ids map to dedicated `reqwest::Client`s with their own cookie
/// jars; everything else gets a per-request client built from the spec.
#[derive(Clone, Default)]
pub struct HttpClient {
    sessions: Arc<DashMap<String, reqwest::Client>>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_session(&self, session: &str) {
        self.sessions.remove(session);
    }

    pub fn clear_sessions(&self) {
        self.sessions.clear();
    }

    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response, TransportError> {
        let url = reqwest::Url::parse(&spec.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", spec.url)))?;

        let client = match &spec.session {
            Some(id) => match self.sessions.get(id) {
                Some(existing) => existing.value().clone(),
                None => {
                    let client = build_client(spec, true)?;
                    self.sessions.insert(id.clone(), client.clone());
                    client
                }
            },
            None => build_client(spec, false)?,
        };

        let mut request = client.request(method_to_reqwest(spec.method), url);
        for (name, value) in &spec.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        debug!(method = %spec.method, url = %spec.url, "Sending request");
        let started = Instant::now();
        let response = request.send().await.map_err(classify)?;

        let status_code = response.status().as_u16();

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
            // first-wins for duplicate header names
            headers.entry(name.to_string()).or_insert(text);
        }

        let mut cookies = BTreeMap::new();
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            let text = String::from_utf8_lossy(value.as_bytes());
            if let Some((name, rest)) = text.split_once('=') {
                let value = rest.split(';').next().unwrap_or("").trim().to_string();
                cookies.entry(name.trim().to_string()).or_insert(value);
            }
        }

        let body = response.bytes().await.map_err(classify)?.to_vec();
        let elapsed = started.elapsed();
        let body_text = String::from_utf8_lossy(&body).into_owned();

        Ok(Response {
            status_code,
            headers,
            body,
            body_text,
            cookies,
            elapsed,
        })
    }
}

fn method_to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn build_client(spec: &RequestSpec, with_cookie_jar: bool) -> Result<reqwest::Client, TransportError> {
    let redirect = if spec.follow_redirects {
        reqwest::redirect::Policy::limited(MAX_REDIRECTS)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(!spec.verify_tls)
        .timeout(spec.timeout)
        .redirect(redirect)
        .cookie_store(with_cookie_jar);

    if let Some(proxy) = &spec.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| TransportError::ProxyFailure(format!("{proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Map a reqwest error onto the transport taxonomy by inspecting its
/// flags and source chain.
fn classify(error: reqwest::Error) -> TransportError {
    let mut detail = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }
    let lower = detail.to_lowercase();

    if error.is_timeout() {
        if error.is_connect() {
            return TransportError::ConnectTimeout(detail);
        }
        return TransportError::ReadTimeout(detail);
    }
    if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
        return TransportError::TlsFailure(detail);
    }
    if lower.contains("dns") || lower.contains("failed to lookup") {
        return TransportError::DnsFailure(detail);
    }
    if lower.contains("proxy") {
        return TransportError::ProxyFailure(detail);
    }
    if error.is_builder() || error.is_request() && lower.contains("url") {
        return TransportError::InvalidUrl(detail);
    }
    TransportError::Io(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = RequestSpec::new(Method::Get, "http://example.com/");
        assert!(spec.verify_tls);
        assert!(spec.follow_redirects);
        assert_eq!(spec.timeout, Duration::from_secs(30));
        assert!(spec.session.is_none());
    }

    #[test]
    fn test_builder_style() {
        let spec = RequestSpec::new(Method::Post, "http://example.com/")
            .with_verify_tls(false)
            .with_timeout(Duration::from_secs(5))
            .with_session("scan-1");
        assert!(!spec.verify_tls);
        assert_eq!(spec.timeout, Duration::from_secs(5));
        assert_eq!(spec.session.as_deref(), Some("scan-1"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let client = HttpClient::new();
        let spec = RequestSpec::new(Method::Get, "not a url");
        let err = client.execute(&spec).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
