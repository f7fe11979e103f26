//! Integration tests for the request executor against a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use forgelink_client::{
    ClientConfig, MemoryTokenStore, Notifier, RequestDescriptor, RequestExecutor,
};
use forgelink_domain::ClientError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Notifier that records every terminal failure it is handed.
#[derive(Default)]
struct CountingNotifier {
    count: AtomicUsize,
    errors: Mutex<Vec<ClientError>>,
}

impl Notifier for CountingNotifier {
    fn notify(&self, error: &ClientError) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.errors.lock().push(error.clone());
    }
}

fn executor_for(server: &MockServer, token: &str) -> (RequestExecutor, Arc<CountingNotifier>) {
    let notifier = Arc::new(CountingNotifier::default());
    let executor = RequestExecutor::builder()
        .config(ClientConfig::new(server.uri()))
        .tokens(Arc::new(MemoryTokenStore::with_token(token)))
        .notifier(notifier.clone())
        .build()
        .expect("executor");
    (executor, notifier)
}

#[tokio::test]
async fn repeated_get_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [1, 2] })))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    let first: Vec<i64> = executor.get("/products").await.expect("first get");
    let second: Vec<i64> = executor.get("/products").await.expect("second get");
    assert_eq!(first, second);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn mutation_invalidates_the_resource_family() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": 5 } })))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    executor.csrf().prime("csrf-1");

    let _: Vec<Value> = executor.get("/products").await.expect("warm");
    let _: Vec<Value> = executor.get("/products").await.expect("cached");
    let _: Value = executor.post("/products", &json!({ "sku": "A1" })).await.expect("create");
    // the mutation purged /products, so this one goes to the network
    let _: Vec<Value> = executor.get("/products").await.expect("fresh");
}

#[tokio::test]
async fn rate_limiting_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "60")
                .set_body_string("slow down"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (executor, notifier) = executor_for(&server, "tok");
    let result: Result<Value, _> = executor.get("/limited").await;

    match result {
        Err(ClientError::RateLimited { reset_after }) => {
            assert_eq!(reset_after, Some(Duration::from_secs(60)));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    // one terminal notification, zero per-attempt spam
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_errors_are_retried_with_growing_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let (executor, notifier) = executor_for(&server, "tok");
    let descriptor = RequestDescriptor::get("/flaky").retry_base_delay(Duration::from_millis(50));

    let started = Instant::now();
    let result = executor.execute(&descriptor).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ClientError::Server { status: 500, .. })));
    // waits of ~50, 100, 200ms between the 4 calls
    assert!(elapsed >= Duration::from_millis(350), "elapsed {elapsed:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such resource"))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    let result: Result<Value, _> = executor.get("/missing").await;

    match result {
        Err(ClientError::ValidationRejected { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such resource");
        }
        other => panic!("expected validation rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn csrf_rejection_refetches_once_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/machines"))
        .and(header("X-CSRF-Token", "stale-token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("CSRF token invalid"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/csrf-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "csrfToken": "fresh-token" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/machines"))
        .and(header("X-CSRF-Token", "fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": 3 } })))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    executor.csrf().prime("stale-token");

    let created: Value = executor.post("/machines", &json!({ "name": "press" })).await.expect("post");
    assert_eq!(created["id"], 3);
}

#[tokio::test]
async fn second_csrf_rejection_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/machines"))
        .respond_with(ResponseTemplate::new(403).set_body_string("csrf validation failed"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/csrf-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "csrfToken": "second" } })),
        )
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    executor.csrf().prime("first");

    let result: Result<Value, _> = executor.post("/machines", &json!({})).await;
    assert!(matches!(result, Err(ClientError::CsrfRejected)));
}

#[tokio::test]
async fn no_content_responses_yield_an_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/work-entries/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    executor.csrf().prime("csrf-1");
    executor.delete("/work-entries/9").await.expect("delete");
}

#[tokio::test]
async fn wrapped_and_bare_envelopes_both_parse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wrapped"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [1, 2, 3] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    let wrapped: Vec<i64> = executor.get("/wrapped").await.expect("wrapped");
    let bare: Vec<i64> = executor.get("/bare").await.expect("bare");
    assert_eq!(wrapped, bare);
}

#[tokio::test]
async fn binary_responses_bypass_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "tok");
    let first = executor.get_bytes("/report.pdf").await.expect("first");
    let second = executor.get_bytes("/report.pdf").await.expect("second");
    assert_eq!(first, b"%PDF-1.7");
    assert_eq!(second, b"%PDF-1.7");
}

#[tokio::test]
async fn bearer_token_is_attached_to_authenticated_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("Authorization", "Bearer shift-lead"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": 1 } })))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, "shift-lead");
    let _: Value = executor.get("/me").await.expect("get");
}

#[tokio::test]
async fn hard_timeout_is_classified_not_hung() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let notifier = Arc::new(CountingNotifier::default());
    let config = ClientConfig {
        standard_timeout: Duration::from_millis(100),
        ..ClientConfig::new(server.uri())
    };
    let executor = RequestExecutor::builder()
        .config(config)
        .tokens(Arc::new(MemoryTokenStore::with_token("tok")))
        .notifier(notifier.clone())
        .build()
        .expect("executor");

    let descriptor = RequestDescriptor::get("/slow").retry_budget(0);
    let result = executor.execute(&descriptor).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abrupt_connection_drop_is_classified_as_policy_blocked() {
    // A server that accepts the connection and hangs up before answering
    // produces a request-level failure with no status, the same opaque shape
    // a cross-origin policy rejection has.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => drop(socket),
                Err(_) => break,
            }
        }
    });

    let notifier = Arc::new(CountingNotifier::default());
    let executor = RequestExecutor::builder()
        .config(ClientConfig::new(format!("http://{addr}")))
        .tokens(Arc::new(MemoryTokenStore::with_token("tok")))
        .notifier(notifier.clone())
        .build()
        .expect("executor");

    let result: Result<Value, _> = executor.get("/resource").await;
    match result {
        Err(ClientError::CrossOriginBlocked { origin, url }) => {
            assert_eq!(origin, format!("http://{addr}"));
            assert!(url.contains("/resource"), "url was {url}");
        }
        other => panic!("expected cross-origin classification, got {other:?}"),
    }
    // not retryable: one terminal notification, no backoff churn
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_check_reports_reachability_without_notifying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, notifier) = executor_for(&server, "tok");
    assert!(executor.health_check().await.expect("health"));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unhealthy_backend_reports_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, notifier) = executor_for(&server, "tok");
    assert!(!executor.health_check().await.expect("health"));
    assert_eq!(notifier.count.load(Ordering::SeqCst), 0);
}
