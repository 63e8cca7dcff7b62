//! End-to-end template execution against a local HTTP server.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use poxide::controller::{Controller, Mode};
use poxide::engine::Engine;
use poxide::expr::Value;
use poxide::registry::TemplateHandle;
use poxide::template::parse;

async fn login() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert("X-CSRF", "tok42".parse().unwrap());
    (StatusCode::OK, headers, "login page")
}

async fn auth(headers: HeaderMap) -> impl IntoResponse {
    match headers.get("X-CSRF").and_then(|v| v.to_str().ok()) {
        Some("tok42") => (StatusCode::FOUND, "Welcome"),
        _ => (StatusCode::FORBIDDEN, "bad csrf"),
    }
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/", get(|| async { "hello world" }))
        .route("/login", get(login))
        .route("/auth", post(auth))
        .route("/ok", get(|| async { "OK" }))
        .route("/forbidden", get(|| async { "FORBIDDEN" }))
        .route(
            "/whoami",
            get(|| async { r#"{"user": {"name": "svc-account", "uid": 1001}}"# }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn controller_with(name: &str, yaml: &str) -> Controller {
    let controller = Controller::new();
    let template = parse(yaml).expect("template parses");
    controller
        .registry()
        .register(name, TemplateHandle::Yaml(template))
        .expect("register");
    controller
}

#[tokio::test]
async fn scenario_pure_status_match() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: status-check, author: t, severity: info }
requests:
  - method: GET
    path: "/"
    matchers:
      - type: status
        status: [200]
"#;

    // engine-level: exactly one request, nothing extracted
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, &target, &BTreeMap::new())
        .await;
    assert!(outcome.matched);
    assert_eq!(outcome.requests_issued, 1);
    assert!(outcome.extracted.is_empty());
    assert!(outcome.last_error.is_none());

    // controller-level: success output with VerifyInfo evidence
    let controller = controller_with("s1", yaml);
    let output = controller
        .execute_poc("s1", &target, Mode::Verify)
        .await
        .unwrap();
    assert!(output.success);
    assert!(output.data.contains_key("VerifyInfo"));
}

#[tokio::test]
async fn scenario_chained_extraction_and_substitution() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: csrf-chain, author: t, severity: medium }
variables: { user: admin }
requests:
  - method: GET
    path: "/login"
    extractors:
      - { type: kval, name: csrf, part: header, kval: [X-CSRF] }
  - method: POST
    path: "/auth"
    headers: { X-CSRF: "{{csrf['X-CSRF']}}" }
    body: '{"u":"{{user}}"}'
    matchers:
      - { type: status, status: [200, 302] }
      - { type: word, part: body, words: [Welcome], condition: or }
"#;
    // /auth only answers 302 when the extracted token from /login comes
    // back literally, so a pass proves cross-request propagation.
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, &target, &BTreeMap::new())
        .await;
    assert!(outcome.matched, "chain failed: {:?}", outcome.last_error);
    assert_eq!(outcome.requests_issued, 2);

    let csrf = outcome.extracted.get("csrf").expect("csrf extracted");
    if let Value::Map(map) = csrf {
        assert_eq!(map.get("X-CSRF"), Some(&Value::Str("tok42".into())));
    } else {
        panic!("csrf should be a map, got {csrf:?}");
    }
}

#[tokio::test]
async fn scenario_negative_matcher() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: forbidden-marker, author: t }
requests:
  - method: GET
    path: "/ok"
    matchers:
      - { type: word, words: [FORBIDDEN], negative: true }
"#;
    let controller = controller_with("s3", yaml);
    let output = controller
        .execute_poc("s3", &target, Mode::Verify)
        .await
        .unwrap();
    assert!(output.success);

    let yaml_hit = yaml.replace("/ok", "/forbidden");
    let controller = controller_with("s3b", &yaml_hit);
    let output = controller
        .execute_poc("s3b", &target, Mode::Verify)
        .await
        .unwrap();
    assert!(!output.success);
}

#[tokio::test]
async fn scenario_transport_abort() {
    // Port 1 on loopback is unroutable for any sane test host.
    let yaml = r#"
info: { name: dead-host, author: t }
requests:
  - method: GET
    path: "/first"
    extractors:
      - { type: regex, name: leak, regex: ["(.+)"] }
  - method: GET
    path: "/second"
    matchers:
      - { type: status, status: [200] }
"#;
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, "http://127.0.0.1:1", &BTreeMap::new())
        .await;
    assert!(!outcome.matched);
    assert_eq!(outcome.requests_issued, 1);
    assert!(outcome.extracted.is_empty());
    assert!(outcome.last_error.is_some());

    let controller = controller_with("s4", yaml);
    let output = controller
        .execute_poc("s4", "http://127.0.0.1:1", Mode::Verify)
        .await
        .unwrap();
    assert!(!output.success);
    assert!(
        output.message.contains("transport error"),
        "message should mention the transport failure: {}",
        output.message
    );
}

#[tokio::test]
async fn scenario_shell_mode_rejected() {
    let yaml = r#"
info: { name: shell-check, author: t }
requests:
  - method: GET
    path: "/"
"#;
    let controller = controller_with("s5", yaml);
    let output = controller
        .execute_poc("s5", "http://127.0.0.1:1", Mode::Shell)
        .await
        .unwrap();
    assert!(!output.success);
    assert_eq!(output.message, "shell mode is not supported for YAML POCs");
}

#[tokio::test]
async fn scenario_directory_load_with_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("good.yaml"),
        "info:\n  name: good\nrequests:\n  - method: GET\n    path: /\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("bad.yaml"), "info:\n  name: bad\nrequests: []\n").unwrap();

    let controller = Controller::new();
    let loaded = controller.load_pocs_from_dir(dir.path()).unwrap();
    assert_eq!(loaded, vec!["good".to_string()]);

    let registry = controller.registry();
    assert!(registry.get("good").is_some());
    assert!(registry.get("bad").is_none());
}

#[tokio::test]
async fn attack_mode_labels_evidence_differently() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: modes, author: t }
requests:
  - method: GET
    path: "/"
    matchers:
      - { type: status, status: [200] }
"#;
    let controller = controller_with("modes", yaml);
    let verify = controller
        .execute_poc("modes", &target, Mode::Verify)
        .await
        .unwrap();
    let attack = controller
        .execute_poc("modes", &target, Mode::Attack)
        .await
        .unwrap();
    assert!(verify.data.contains_key("VerifyInfo"));
    assert!(attack.data.contains_key("AttackInfo"));
}

#[tokio::test]
async fn options_flow_into_interpolation() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: opts, author: t }
requests:
  - method: GET
    path: "/{{probe_path}}"
    matchers:
      - { type: word, words: [OK] }
"#;
    let controller = controller_with("opts", yaml);
    controller.set_option("probe_path", Value::Str("ok".into()));
    let output = controller
        .execute_poc("opts", &target, Mode::Verify)
        .await
        .unwrap();
    assert!(output.success, "option was not visible: {}", output.message);
}

#[tokio::test]
async fn json_extractor_end_to_end() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: json-poc, author: t }
requests:
  - method: GET
    path: "/whoami"
    matchers:
      - { type: status, status: [200] }
    extractors:
      - { type: json, name: account, json: ["$.user.name"] }
"#;
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, &target, &BTreeMap::new())
        .await;
    assert!(outcome.matched);
    assert_eq!(
        outcome.extracted.get("account"),
        Some(&Value::Str("svc-account".into()))
    );
}

#[tokio::test]
async fn internal_extractor_hidden_from_evidence() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: internal, author: t }
requests:
  - method: GET
    path: "/login"
    extractors:
      - { type: kval, name: csrf, kval: [X-CSRF], internal: true }
  - method: POST
    path: "/auth"
    headers: { X-CSRF: "{{csrf['X-CSRF']}}" }
    matchers:
      - { type: status, status: [302] }
"#;
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, &target, &BTreeMap::new())
        .await;
    // still usable for the second request, but not in the evidence
    assert!(outcome.matched);
    assert!(!outcome.extracted.contains_key("csrf"));
}

#[tokio::test]
async fn matcher_miss_stops_chain_cleanly() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: miss, author: t }
requests:
  - method: GET
    path: "/"
    matchers:
      - { type: status, status: [500] }
  - method: GET
    path: "/ok"
"#;
    let template = parse(yaml).unwrap();
    let outcome = Engine::new()
        .execute(&template, &target, &BTreeMap::new())
        .await;
    assert!(!outcome.matched);
    assert_eq!(outcome.requests_issued, 1);
    assert!(outcome.last_error.is_none());
}

#[tokio::test]
async fn results_accumulate_and_clear() {
    let target = spawn_server().await;
    let yaml = r#"
info: { name: acc, author: t }
requests:
  - method: GET
    path: "/"
    matchers:
      - { type: status, status: [200] }
"#;
    let controller = controller_with("acc", yaml);
    controller
        .execute_poc("acc", &target, Mode::Verify)
        .await
        .unwrap();
    controller
        .execute_poc("acc", &target, Mode::Attack)
        .await
        .unwrap();
    assert_eq!(controller.get_results().len(), 2);

    controller.clear_results();
    assert!(controller.get_results().is_empty());
}
