//! Shared helpers for the integration tests

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use huaan_rs_client::{ClientConfig, LoginRedirect, RequestPipeline, TokenPair, TokenStore};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use wiremock::MockServer;

/// Redirect that remembers every call
#[derive(Default)]
pub struct RecordingRedirect {
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingRedirect {
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn to_login(&self, login_path: &str, return_to: Option<&str>) {
        self.calls
            .lock()
            .unwrap()
            .push((login_path.to_string(), return_to.map(str::to_owned)));
    }
}

pub struct Harness {
    pub server: MockServer,
    pub client: Arc<RequestPipeline>,
    pub store: TokenStore,
    pub redirect: Arc<RecordingRedirect>,
}

pub async fn harness() -> Harness {
    harness_with(|uri| ClientConfig::admin(format!("{uri}/api"))).await
}

pub async fn harness_with(config: impl FnOnce(&str) -> ClientConfig) -> Harness {
    let server = MockServer::start().await;
    let store = TokenStore::in_memory();
    let redirect = Arc::new(RecordingRedirect::default());
    let client = RequestPipeline::new(config(&server.uri()), store.clone(), redirect.clone()).unwrap();

    Harness {
        server,
        client,
        store,
        redirect,
    }
}

/// Unsigned JWT carrying `claims`; the client never checks signatures
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Unsigned access token expiring `secs` from now
pub fn token_expiring_in(secs: i64) -> String {
    unsigned_token(&json!({"sub": "42", "exp": chrono::Utc::now().timestamp() + secs}))
}

pub fn store_tokens(store: &TokenStore, access: &str, refresh: &str) {
    store.set(&TokenPair::new(access, refresh)).unwrap();
}

pub fn envelope(data: Value) -> Value {
    json!({"code": 200000, "message": "success", "data": data})
}

pub fn failure(code: i64, message: &str) -> Value {
    json!({"code": code, "message": message})
}
