//! Integration tests for the token refresher

mod common;

use common::{RecordingRedirect, envelope, failure, harness, store_tokens, token_expiring_in};
use huaan_rs_client::token_store::TOKENS_KEY;
use huaan_rs_client::{
    ClientConfig, ClientError, KeyValueStorage, MemoryStorage, RefreshFailure, RequestPipeline,
    Result as ClientResult, TokenRefresher, TokenStore,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(-30), "refresh-1");
    let new_access = token_expiring_in(7200);

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({
                    "access_token": new_access,
                    "refresh_token": "refresh-2",
                    "expires_in": 7200
                })))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let refresher = h.client.refresher();
    let (a, b, c, d) = tokio::join!(
        refresher.ensure_valid(),
        refresher.ensure_valid(),
        refresher.ensure_valid(),
        refresher.ensure_valid(),
    );

    for result in [a, b, c, d] {
        assert_eq!(result, Ok(Some(new_access.clone())));
    }
    assert_eq!(h.store.access_token(), Some(new_access));
    assert_eq!(h.store.refresh_token().as_deref(), Some("refresh-2"));

    h.server.verify().await;
}

#[tokio::test]
async fn test_fresh_token_makes_no_network_call() {
    let h = harness().await;
    let access = token_expiring_in(3600);
    store_tokens(&h.store, &access, "refresh-1");

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    assert_eq!(h.client.refresher().ensure_valid().await, Ok(Some(access)));
    h.server.verify().await;
}

#[tokio::test]
async fn test_token_expiring_in_30s_is_refreshed_once() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(30), "refresh-1");
    let new_access = token_expiring_in(7200);

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(json!({"access_token": new_access}))),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.client.refresher().ensure_valid().await, Ok(Some(new_access.clone())));
    // The new token is fresh, so a second call stays local
    assert_eq!(h.client.refresher().ensure_valid().await, Ok(Some(new_access)));

    // Refresh token was not rotated and must survive
    assert_eq!(h.store.refresh_token().as_deref(), Some("refresh-1"));
    h.server.verify().await;
}

#[tokio::test]
async fn test_rejection_reaches_every_waiter_and_keeps_tokens() {
    let h = harness().await;
    let expired = token_expiring_in(-5);
    store_tokens(&h.store, &expired, "refresh-1");

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(failure(401005, "refresh token invalid"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let refresher = h.client.refresher();
    let (a, b, c) = tokio::join!(
        refresher.ensure_valid(),
        refresher.ensure_valid(),
        refresher.ensure_valid(),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(RefreshFailure::Rejected(_))), "got {result:?}");
    }
    assert_eq!(h.store.access_token(), Some(expired));
    assert_eq!(h.store.refresh_token().as_deref(), Some("refresh-1"));
    assert!(h.redirect.calls().is_empty());
    h.server.verify().await;
}

#[tokio::test]
async fn test_next_expiry_cycle_starts_a_new_refresh() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(-5), "refresh-1");

    // The refreshed token is itself about to expire
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({"access_token": token_expiring_in(10)}))),
        )
        .expect(2)
        .mount(&h.server)
        .await;

    assert!(h.client.refresher().ensure_valid().await.unwrap().is_some());
    assert!(h.client.refresher().ensure_valid().await.unwrap().is_some());
    h.server.verify().await;
}

#[tokio::test]
async fn test_http_error_from_refresh_endpoint_is_rejection() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(-5), "refresh-1");

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.client.refresher().ensure_valid().await;
    assert!(matches!(result, Err(RefreshFailure::Rejected(_))));
}

#[tokio::test]
async fn test_waiter_gets_token_when_leading_caller_is_dropped() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(-30), "refresh-1");
    let new_access = token_expiring_in(7200);

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({
                    "access_token": new_access,
                    "refresh_token": "refresh-2"
                })))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let refresher = h.client.refresher().clone();
    let waiter = tokio::spawn({
        let refresher = refresher.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            refresher.ensure_valid().await
        }
    });

    let leader = tokio::time::timeout(Duration::from_millis(50), refresher.ensure_valid()).await;
    assert!(leader.is_err(), "leading caller should have timed out");

    assert_eq!(waiter.await.unwrap(), Ok(Some(new_access.clone())));
    // The dropped caller's refresh still landed, including the rotated token
    assert_eq!(h.store.access_token(), Some(new_access));
    assert_eq!(h.store.refresh_token().as_deref(), Some("refresh-2"));
    h.server.verify().await;
}

#[tokio::test]
async fn test_auto_refresh_task_refreshes_and_stops_with_refresher() {
    let h = harness().await;
    store_tokens(&h.store, &token_expiring_in(30), "refresh-1");
    let new_access = token_expiring_in(7200);

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(json!({"access_token": new_access}))),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let config = ClientConfig::admin(format!("{}/api", h.server.uri()));
    let refresher = Arc::new(TokenRefresher::new(&config, h.store.clone(), reqwest::Client::new()));
    let task = refresher.spawn_auto_refresh(Duration::from_millis(50));

    // Several ticks; only the first finds the token expiring
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.store.access_token(), Some(new_access));
    h.server.verify().await;

    drop(refresher);
    let finished = tokio::time::timeout(Duration::from_secs(1), task).await;
    assert!(matches!(finished, Ok(Ok(()))), "task should stop once the refresher is gone");
}

#[tokio::test]
async fn test_auto_refresh_failure_keeps_session() {
    let h = harness().await;
    let expiring = token_expiring_in(30);
    store_tokens(&h.store, &expiring, "refresh-1");
    h.store.set_user(Some(&json!({"id": 42}))).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failure(401005, "refresh token invalid")))
        .mount(&h.server)
        .await;

    let config = ClientConfig::admin(format!("{}/api", h.server.uri()));
    let refresher = Arc::new(TokenRefresher::new(&config, h.store.clone(), reqwest::Client::new()));
    let task = refresher.spawn_auto_refresh(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(200)).await;
    task.abort();

    let received = h.server.received_requests().await.unwrap();
    assert!(!received.is_empty());
    assert_eq!(h.store.access_token(), Some(expiring));
    assert_eq!(h.store.refresh_token().as_deref(), Some("refresh-1"));
    assert_eq!(h.store.user(), Some(json!({"id": 42})));
}

/// Memory storage whose token writes can be made to fail
struct ReadOnlyTokens {
    inner: MemoryStorage,
    read_only: Arc<AtomicBool>,
}

impl KeyValueStorage for ReadOnlyTokens {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> ClientResult<()> {
        if key == TOKENS_KEY && self.read_only.load(Ordering::SeqCst) {
            return Err(ClientError::Storage("disk is read-only".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn test_unsaved_refresh_is_storage_failure_not_logout() {
    let server = wiremock::MockServer::start().await;
    let read_only = Arc::new(AtomicBool::new(false));
    let store = TokenStore::new(ReadOnlyTokens {
        inner: MemoryStorage::new(),
        read_only: read_only.clone(),
    });
    let expired = token_expiring_in(-5);
    store_tokens(&store, &expired, "refresh-1");
    read_only.store(true, Ordering::SeqCst);

    let redirect = Arc::new(RecordingRedirect::default());
    let client = RequestPipeline::new(
        ClientConfig::admin(format!("{}/api", server.uri())),
        store.clone(),
        redirect.clone(),
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({"access_token": token_expiring_in(7200)}))),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(
        client.refresher().ensure_valid().await,
        Err(RefreshFailure::Storage(_))
    ));

    let result = client.list_records().await;
    assert!(matches!(result, Err(ClientError::Storage(_))), "got {result:?}");
    assert_eq!(store.access_token(), Some(expired));
    assert!(redirect.calls().is_empty());
    server.verify().await;
}
