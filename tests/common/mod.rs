#![allow(dead_code)]

use std::time::Duration;

use config_server_client::config::ClientOptions;
use serde_json::{json, Map, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const APP_PATH: &str = "/app/Production";

/// Options pointing at `uri` with a short timeout.
pub fn options(uri: &str) -> ClientOptions {
    ClientOptions {
        name: "app".to_string(),
        uri: uri.to_string(),
        timeout: 2_000,
        ..ClientOptions::default()
    }
}

/// An environment document with a single property source.
pub fn environment_body(version: &str, pairs: &[(&str, &str)]) -> String {
    let source: Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();

    json!({
        "name": "app",
        "profiles": ["Production"],
        "label": null,
        "version": version,
        "state": null,
        "propertySources": [{ "name": "app.yml", "source": source }]
    })
    .to_string()
}

pub fn json_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "application/json")
}

/// Serves `body` for every `GET {APP_PATH}`.
pub async fn serve_environment(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(json_response(body))
        .mount(server)
        .await;
}

pub async fn serve_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

/// Paths of every request the server received, in arrival order.
pub async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect()
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
