//! Single-flight renewal behavior under concurrent credential expiry.

use std::sync::Arc;
use std::time::Duration;

use forgelink_client::{ClientConfig, MemoryTokenStore, RefreshCoordinator, RequestExecutor, TokenStore};
use forgelink_domain::ClientError;
use futures::future::join_all;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn coordinator(server: &MockServer, store: Arc<MemoryTokenStore>) -> RefreshCoordinator {
    RefreshCoordinator::new(
        reqwest::Client::new(),
        format!("{}/auth/refresh", server.uri()),
        Duration::from_secs(10),
        store,
    )
}

#[tokio::test]
async fn concurrent_callers_share_one_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({ "data": { "accessToken": "renewed" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let coordinator = Arc::new(coordinator(&server, store.clone()));

    let waiters = (0..5).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.refresh().await })
    });
    for outcome in join_all(waiters).await {
        outcome.expect("task").expect("refresh");
    }

    assert_eq!(store.access_token().await.as_deref(), Some("renewed"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sequential_renewals_each_hit_the_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "accessToken": "t" } })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let coordinator = coordinator(&server, store);

    coordinator.refresh().await.expect("first");
    assert!(!coordinator.in_flight());
    coordinator.refresh().await.expect("second");
}

#[tokio::test]
async fn rejected_renewal_clears_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let coordinator = coordinator(&server, store.clone());

    let result = coordinator.refresh().await;
    assert!(matches!(result, Err(ClientError::AuthRenewalFailed(_))));
    assert_eq!(store.access_token().await, None);
}

#[tokio::test]
async fn transient_renewal_failure_keeps_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let coordinator = coordinator(&server, store.clone());

    let result = coordinator.refresh().await;
    assert!(matches!(result, Err(ClientError::Server { status: 502, .. })));
    // a flaky renewal call must not log the operator out
    assert_eq!(store.access_token().await.as_deref(), Some("stale"));
}

#[tokio::test]
async fn expired_credential_is_renewed_transparently_mid_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protected"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/protected"))
        .and(header("Authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "ok": true } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({ "data": { "accessToken": "renewed" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let executor = Arc::new(
        RequestExecutor::builder()
            .config(ClientConfig::new(server.uri()))
            .tokens(Arc::new(MemoryTokenStore::with_token("stale")))
            .build()
            .expect("executor"),
    );

    // several requests hit the expiry at once; one renewal serves them all
    let calls = (0..4).map(|n| {
        let executor = executor.clone();
        tokio::spawn(async move {
            let body: Value = executor.get(&format!("/protected?n={n}")).await?;
            Ok::<_, ClientError>(body)
        })
    });
    for outcome in join_all(calls).await {
        let body = outcome.expect("task").expect("request");
        assert_eq!(body["ok"], true);
    }

    let renewals = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/auth/refresh")
        .count();
    assert_eq!(renewals, 1);
}

#[tokio::test]
async fn failed_renewal_surfaces_auth_expiry_to_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protected"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token("stale"));
    let executor = RequestExecutor::builder()
        .config(ClientConfig::new(server.uri()))
        .tokens(store.clone())
        .build()
        .expect("executor");

    let result: Result<Value, _> = executor.get("/protected").await;
    assert!(matches!(result, Err(ClientError::AuthRenewalFailed(_))));
    assert_eq!(store.access_token().await, None);
}
