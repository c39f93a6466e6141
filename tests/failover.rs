mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use config_server_client::client::ConfigServerLocator;
use config_server_client::error::{ConfigServerError, FetchFailure};
use config_server_client::provider::ConfigServerProvider;
use config_server_client::store::snapshot::VERSION_KEY;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    environment_body, json_response, options, request_count, request_paths, serve_environment,
    serve_status, APP_PATH,
};

/// Serves `response` for `GET {APP_PATH}/{label}`.
async fn serve_label(server: &MockServer, label: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", APP_PATH, label)))
        .respond_with(response)
        .mount(server)
        .await;
}

fn labelled_path(label: &str) -> String {
    format!("{}/{}", APP_PATH, label)
}

#[tokio::test]
async fn test_found_environment_is_merged_into_store() {
    let server = MockServer::start().await;
    serve_environment(
        &server,
        environment_body(
            "abc123",
            &[("featureToggles.ShowModule[0]", "FT1"), ("logging.level", "Debug")],
        ),
    )
    .await;

    let provider = ConfigServerProvider::new(options(&server.uri())).unwrap();
    let token = provider.reload_token();

    let env = provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(env.source_names(), vec!["app.yml"]);
    assert_eq!(
        provider.try_get("featureToggles:ShowModule:0").as_deref(),
        Some("FT1")
    );
    assert_eq!(provider.try_get("LOGGING:LEVEL").as_deref(), Some("Debug"));
    assert_eq!(provider.try_get(VERSION_KEY).as_deref(), Some("abc123"));
    assert_eq!(provider.try_get("spring:cloud:config:name").as_deref(), Some("app"));
    assert!(token.has_changed());
    assert_eq!(provider.metrics().request_count("success"), 1);
}

#[tokio::test]
async fn test_not_found_halts_the_walk() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_status(&first, 404).await;
    serve_environment(&second, environment_body("v1", &[("k", "v")])).await;

    let uris = format!("{},{}", first.uri(), second.uri());
    let provider = ConfigServerProvider::new(options(&uris)).unwrap();

    let loaded = provider.load_async(true, &CancellationToken::new()).await.unwrap();

    assert!(loaded.is_none());
    assert_eq!(request_count(&first).await, 1);
    assert_eq!(request_count(&second).await, 0);
    assert_eq!(provider.try_get("k"), None);
    assert_eq!(provider.metrics().loads_total.with_label_values(&["empty"]).get(), 1);
}

#[tokio::test]
async fn test_not_found_with_fail_fast_is_not_located() {
    let server = MockServer::start().await;
    serve_status(&server, 404).await;

    let mut opts = options(&server.uri());
    opts.fail_fast = true;
    opts.retry.enabled = true;
    opts.retry.initial_interval = 10;
    let provider = ConfigServerProvider::new(opts).unwrap();

    let err = provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ConfigServerError::NotLocated { .. }));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_server_error_fails_over_to_next_uri() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_status(&first, 500).await;
    serve_environment(&second, environment_body("v2", &[("k", "from-second")])).await;

    let uris = format!("{},{}", first.uri(), second.uri());
    let provider = ConfigServerProvider::new(options(&uris)).unwrap();

    let env = provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(env.version.as_deref(), Some("v2"));
    assert_eq!(request_count(&first).await, 1);
    assert_eq!(request_count(&second).await, 1);
    assert_eq!(provider.try_get("k").as_deref(), Some("from-second"));
    assert_eq!(provider.metrics().request_count("error_status"), 1);
}

#[tokio::test]
async fn test_fail_fast_retry_exhausts_and_errors() {
    let server = MockServer::start().await;
    serve_status(&server, 500).await;

    let mut opts = options(&server.uri());
    opts.fail_fast = true;
    opts.retry.enabled = true;
    opts.retry.initial_interval = 10;
    opts.retry.max_interval = 20;
    let provider = ConfigServerProvider::new(opts).unwrap();
    let before = provider.snapshot();

    let err = provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ConfigServerError::Exhausted { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].failure, FetchFailure::Status(500));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(request_count(&server).await, 6);
    assert!(before.diff(&provider.snapshot()).is_empty());
    assert_eq!(provider.metrics().walks_exhausted_total.get(), 6);
}

#[tokio::test]
async fn test_failure_without_fail_fast_loads_nothing() {
    let server = MockServer::start().await;
    serve_status(&server, 503).await;

    let mut opts = options(&server.uri());
    opts.retry.enabled = true;
    opts.retry.initial_interval = 10;
    opts.retry.max_attempts = 2;
    let provider = ConfigServerProvider::new(opts).unwrap();
    let token = provider.reload_token();

    let loaded = provider.load_async(true, &CancellationToken::new()).await.unwrap();

    assert!(loaded.is_none());
    assert_eq!(request_count(&server).await, 2);
    assert!(!token.has_changed());

    let loads = &provider.metrics().loads_total;
    assert_eq!(loads.with_label_values(&["failed"]).get(), 1);
    assert_eq!(loads.with_label_values(&["empty"]).get(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_client_makes_no_requests() {
    let server = MockServer::start().await;
    serve_environment(&server, environment_body("v1", &[("k", "v")])).await;

    let mut opts = options(&server.uri());
    opts.enabled = false;
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider.load().unwrap();
    assert!(provider.attach().await.is_ok());

    assert_eq!(request_count(&server).await, 0);
    assert_eq!(provider.try_get("k"), None);
    assert_eq!(
        provider.try_get("spring:cloud:config:enabled").as_deref(),
        Some("False")
    );
}

#[tokio::test]
async fn test_empty_label_response_moves_to_next_label() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/first", APP_PATH)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/feature/second", APP_PATH)))
        .respond_with(json_response(environment_body("v1", &[("k", "labelled")])))
        .expect(1)
        .mount(&server)
        .await;

    let mut opts = options(&server.uri());
    opts.label = Some("first, feature/second".to_string());
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(provider.try_get("k").as_deref(), Some("labelled"));
}

#[tokio::test]
async fn test_timeout_fails_over() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(
            json_response(environment_body("slow", &[("k", "slow")]))
                .set_delay(Duration::from_millis(1_000)),
        )
        .mount(&slow)
        .await;
    serve_environment(&fast, environment_body("fast", &[("k", "fast")])).await;

    let mut opts = options(&format!("{},{}", slow.uri(), fast.uri()));
    opts.timeout = 100;
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(provider.try_get("k").as_deref(), Some("fast"));
    assert_eq!(provider.metrics().request_count("timeout"), 1);
}

#[tokio::test]
async fn test_credentials_from_uri_user_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .and(basic_auth("user", "p+ss"))
        .respond_with(json_response(environment_body("v1", &[("k", "secured")])))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri().replacen("http://", "http://user:p+ss@", 1);
    let provider = ConfigServerProvider::new(options(&uri)).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(provider.try_get("k").as_deref(), Some("secured"));
}

#[tokio::test]
async fn test_token_and_custom_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .and(header("X-Config-Token", "vault-token"))
        .and(header("X-Tenant", "blue"))
        .respond_with(json_response(environment_body("v1", &[("k", "v")])))
        .expect(1)
        .mount(&server)
        .await;

    let mut opts = options(&server.uri());
    opts.token = Some("vault-token".to_string());
    opts.headers.insert("X-Tenant".to_string(), "blue".to_string());
    let provider = ConfigServerProvider::new(opts).unwrap();

    assert!(provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .is_some());
}

struct StaticLocator(Vec<String>);

impl ConfigServerLocator for StaticLocator {
    fn is_available(&self) -> bool {
        true
    }

    fn resolve(&self, _service_id: &str) -> Vec<String> {
        self.0.clone()
    }
}

#[tokio::test]
async fn test_discovery_resolves_base_uris() {
    let server = MockServer::start().await;
    serve_environment(&server, environment_body("v1", &[("k", "discovered")])).await;

    let mut opts = options("http://127.0.0.1:1");
    opts.discovery.enabled = true;
    let locator = Arc::new(StaticLocator(vec![server.uri()]));
    let provider = ConfigServerProvider::with_locator(opts, locator).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(provider.try_get("k").as_deref(), Some("discovered"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_load_removes_stale_keys() {
    let server = MockServer::start().await;
    serve_environment(
        &server,
        environment_body("v1", &[("a[0]", "X"), ("a[1]", "Y"), ("a[2]", "Z")]),
    )
    .await;

    let provider = ConfigServerProvider::new(options(&server.uri())).unwrap();
    provider.load().unwrap();
    assert_eq!(provider.child_keys(Some("a")), vec!["0", "1", "2"]);

    server.reset().await;
    serve_environment(&server, environment_body("v2", &[("a[0]", "W")])).await;
    provider.load().unwrap();

    assert_eq!(provider.try_get("a:0").as_deref(), Some("W"));
    assert_eq!(provider.try_get("a:1"), None);
    assert_eq!(provider.try_get("a:2"), None);
}

#[tokio::test]
async fn test_loading_same_content_twice_is_stable() {
    let server = MockServer::start().await;
    serve_environment(&server, environment_body("v1", &[("a[0]", "X"), ("b", "Y")])).await;

    let provider = ConfigServerProvider::new(options(&server.uri())).unwrap();
    let cancel = CancellationToken::new();
    provider.load_async(true, &cancel).await.unwrap();
    let first = provider.snapshot();
    let token = provider.reload_token();

    provider.load_async(true, &cancel).await.unwrap();

    assert!(first.diff(&provider.snapshot()).is_empty());
    assert!(!token.has_changed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_are_serialized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(
            json_response(environment_body("v1", &[("a", "1"), ("b", "1")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let provider = ConfigServerProvider::new(options(&server.uri())).unwrap();

    let reader = {
        let provider = provider.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = provider.snapshot();
                assert_eq!(snapshot.get("a"), snapshot.get("b"));
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    let started = Instant::now();
    let (left, right) = tokio::join!(
        {
            let provider = provider.clone();
            async move { provider.load_async(true, &CancellationToken::new()).await }
        },
        {
            let provider = provider.clone();
            async move { provider.load_async(true, &CancellationToken::new()).await }
        }
    );

    assert!(left.unwrap().is_some());
    assert!(right.unwrap().is_some());
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(request_count(&server).await, 2);
    reader.await.unwrap();
}

#[tokio::test]
async fn test_cancelled_load_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(APP_PATH))
        .respond_with(
            json_response(environment_body("v1", &[("k", "v")]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let provider = ConfigServerProvider::new(options(&server.uri())).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = provider.load_async(true, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(provider.try_get("k"), None);
}

#[tokio::test]
async fn test_server_error_walks_labels_then_next_uri_in_order() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_label(&first, "a", ResponseTemplate::new(500)).await;
    serve_label(&first, "b", json_response(environment_body("first", &[("k", "first")]))).await;
    serve_label(&second, "a", ResponseTemplate::new(204)).await;
    serve_label(&second, "b", json_response(environment_body("second", &[("k", "second")]))).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.label = Some("a,b".to_string());
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(request_paths(&first).await, vec![labelled_path("a")]);
    assert_eq!(
        request_paths(&second).await,
        vec![labelled_path("a"), labelled_path("b")]
    );
    assert_eq!(provider.try_get("k").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_timeout_abandons_remaining_labels_of_uri() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_label(
        &first,
        "a",
        json_response(environment_body("slow", &[("k", "slow")])).set_delay(Duration::from_millis(1_000)),
    )
    .await;
    serve_label(&first, "b", json_response(environment_body("first", &[("k", "first")]))).await;
    serve_label(&second, "a", json_response(environment_body("second", &[("k", "second")]))).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.label = Some("a,b".to_string());
    opts.timeout = 100;
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(request_paths(&first).await, vec![labelled_path("a")]);
    assert_eq!(request_paths(&second).await, vec![labelled_path("a")]);
    assert_eq!(provider.try_get("k").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_not_found_on_first_label_skips_everything_else() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_label(&first, "a", ResponseTemplate::new(404)).await;
    serve_label(&first, "b", json_response(environment_body("first", &[("k", "first")]))).await;
    serve_label(&second, "a", json_response(environment_body("second", &[("k", "second")]))).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.label = Some("a,b".to_string());
    let provider = ConfigServerProvider::new(opts).unwrap();

    let loaded = provider.load_async(true, &CancellationToken::new()).await.unwrap();

    assert!(loaded.is_none());
    assert_eq!(request_paths(&first).await, vec![labelled_path("a")]);
    assert!(request_paths(&second).await.is_empty());
}

#[tokio::test]
async fn test_error_on_later_label_fails_over_to_next_uri() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_label(&first, "a", ResponseTemplate::new(204)).await;
    serve_label(&first, "b", ResponseTemplate::new(500)).await;
    serve_label(&second, "a", json_response(environment_body("second", &[("k", "second")]))).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.label = Some("a,b".to_string());
    let provider = ConfigServerProvider::new(opts).unwrap();

    provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        request_paths(&first).await,
        vec![labelled_path("a"), labelled_path("b")]
    );
    assert_eq!(request_paths(&second).await, vec![labelled_path("a")]);
    assert_eq!(provider.try_get("k").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_failure_on_last_uri_is_not_hidden_by_earlier_empty_answer() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_status(&first, 204).await;
    serve_status(&second, 500).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.fail_fast = true;
    opts.retry.enabled = true;
    opts.retry.initial_interval = 10;
    opts.retry.max_interval = 20;
    opts.retry.max_attempts = 3;
    let provider = ConfigServerProvider::new(opts).unwrap();

    let err = provider
        .load_async(true, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ConfigServerError::Exhausted { failures } => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].uri.starts_with(&second.uri()));
            assert_eq!(failures[0].failure, FetchFailure::Status(500));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(request_count(&first).await, 3);
    assert_eq!(request_count(&second).await, 3);
}

#[tokio::test]
async fn test_empty_answer_on_last_uri_is_no_content() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_status(&first, 500).await;
    serve_status(&second, 204).await;

    let mut opts = options(&format!("{},{}", first.uri(), second.uri()));
    opts.retry.enabled = true;
    opts.retry.initial_interval = 10;
    let provider = ConfigServerProvider::new(opts).unwrap();

    let loaded = provider.load_async(true, &CancellationToken::new()).await.unwrap();

    assert!(loaded.is_none());
    assert_eq!(request_count(&first).await, 1);
    assert_eq!(request_count(&second).await, 1);
    let loads = &provider.metrics().loads_total;
    assert_eq!(loads.with_label_values(&["empty"]).get(), 1);
    assert_eq!(loads.with_label_values(&["failed"]).get(), 0);
}
