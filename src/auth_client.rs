//! Token refresher with expiry peeking and single-flight refresh

use crate::config::ClientConfig;
use crate::error::RefreshFailure;
use crate::jwt;
use crate::pipeline::build_url;
use crate::token_store::TokenStore;
use crate::types::{Envelope, RefreshRequest, RefreshResponse, TokenPair};
use async_singleflight::Group;
use reqwest::Client;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Single-flight key; there is one refresh token per process
const REFRESH_KEY: &str = "refresh";

/// Result shared by every caller of one refresh operation
type RefreshOutcome = std::result::Result<String, RefreshFailure>;

/// Keeps the access token fresh
///
/// Concurrent callers that find the token expiring share a single call to
/// the refresh endpoint.
pub struct TokenRefresher {
    call: RefreshCall,
    /// Singleflight group so concurrent callers await one refresh request.
    /// The error type is unused: failures travel inside the shared outcome
    /// so that every waiter sees them, not just the leader.
    refresh_singleflight: Group<RefreshOutcome, Infallible>,
}

/// One refresh, owned so it can run on its own task
#[derive(Clone)]
struct RefreshCall {
    token_store: TokenStore,
    http_client: Client,
    refresh_url: Arc<str>,
    refresh_before_expiry_secs: i64,
    /// Held for the whole refresh; a task started for a caller that went
    /// away still finishes before the next one looks at the store
    in_flight: Arc<Mutex<()>>,
}

impl TokenRefresher {
    /// Create a refresher
    ///
    /// # Arguments
    /// * `config` - Client configuration (base URL, refresh path, margin)
    /// * `token_store` - Store the tokens are read from and written to
    /// * `http_client` - Client used for the refresh call; carries the request timeout
    pub fn new(config: &ClientConfig, token_store: TokenStore, http_client: Client) -> Self {
        Self {
            call: RefreshCall {
                token_store,
                http_client,
                refresh_url: build_url(&config.base_url, &config.refresh_path).into(),
                refresh_before_expiry_secs: config.refresh_before_expiry_secs as i64,
                in_flight: Arc::new(Mutex::new(())),
            },
            refresh_singleflight: Group::new(),
        }
    }

    /// Get the token store
    pub fn token_store(&self) -> &TokenStore {
        &self.call.token_store
    }

    /// Return an access token that is valid for at least the safety margin
    ///
    /// - Fresh token or unknown expiry: returned as is, no network call
    /// - Expiring, expired or missing token: refreshed if a refresh token exists
    /// - No refresh token: `Ok(None)`, the caller is not authenticated
    ///
    /// Refresh failures are returned to every waiting caller; tokens are
    /// left in place.
    pub async fn ensure_valid(&self) -> std::result::Result<Option<String>, RefreshFailure> {
        let current = self.token_store().access_token();
        if let Some(token) = &current {
            if !self.call.needs_refresh(token) {
                return Ok(current);
            }
        }

        if self.token_store().refresh_token().is_none() {
            debug!("No refresh token stored, continuing unauthenticated");
            return Ok(None);
        }

        self.refresh_singleflight(current).await.map(Some)
    }

    /// Refresh after the backend rejected `rejected`
    ///
    /// If a concurrent refresh already replaced the rejected token, the
    /// replacement is returned without another network call.
    pub async fn force_refresh(
        &self,
        rejected: Option<&str>,
    ) -> std::result::Result<Option<String>, RefreshFailure> {
        if self.token_store().refresh_token().is_none() {
            return Ok(None);
        }

        self.refresh_singleflight(rejected.map(str::to_owned)).await.map(Some)
    }

    async fn refresh_singleflight(&self, stale: Option<String>) -> RefreshOutcome {
        loop {
            let call = self.call.clone();
            let task_stale = stale.clone();
            let (outcome, _, leader) = self
                .refresh_singleflight
                .work(REFRESH_KEY, async move {
                    // Detached, so dropping the leading caller cannot cut the
                    // refresh short after the server rotated the tokens
                    let outcome = tokio::spawn(call.run(task_stale))
                        .await
                        .unwrap_or_else(|e| {
                            Err(RefreshFailure::Network(format!("refresh task failed: {e}")))
                        });
                    Ok(outcome)
                })
                .await;

            match outcome {
                Some(outcome) => {
                    debug!(leader, "Refresh settled");
                    return outcome;
                }
                // The leading caller was dropped; its task keeps running and
                // the next flight waits for it
                None => debug!("Refresh leader went away, joining the next flight"),
            }
        }
    }

    /// Start a background task that refreshes the token before it expires
    ///
    /// The task runs until the returned handle is aborted or the refresher
    /// is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>, check_interval: Duration) -> JoinHandle<()> {
        let refresher = Arc::downgrade(self);
        tokio::spawn(async move {
            info!(check_interval_ms = check_interval.as_millis() as u64, "Started auto-refresh task");

            let mut interval = tokio::time::interval(check_interval);
            loop {
                interval.tick().await;

                let Some(refresher) = refresher.upgrade() else {
                    debug!("Refresher dropped, stopping auto-refresh task");
                    return;
                };

                match refresher.ensure_valid().await {
                    Ok(Some(_)) => debug!("Auto-refresh check passed"),
                    Ok(None) => debug!("Auto-refresh skipped, not authenticated"),
                    // Don't clear anything here, the next request decides
                    Err(e) => warn!(error = ?e, "Auto-refresh failed"),
                }
            }
        })
    }
}

impl RefreshCall {
    fn needs_refresh(&self, token: &str) -> bool {
        jwt::needs_refresh(token, chrono::Utc::now().timestamp(), self.refresh_before_expiry_secs)
    }

    async fn run(self, stale: Option<String>) -> RefreshOutcome {
        let _in_flight = self.in_flight.lock().await;

        // Another refresh may have finished between our check and now
        if let Some(current) = self.token_store.access_token() {
            if stale.as_deref() != Some(current.as_str()) && !self.needs_refresh(&current) {
                debug!("Access token already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let outcome = self.do_refresh().await;
        if let Err(failure) = &outcome {
            warn!(error = ?failure, "Token refresh failed");
        }
        outcome
    }

    /// Call the refresh endpoint and persist the new pair
    async fn do_refresh(&self) -> RefreshOutcome {
        let refresh_token = self
            .token_store
            .refresh_token()
            .ok_or_else(|| RefreshFailure::Rejected("no refresh token stored".to_string()))?;

        debug!(url = %self.refresh_url, "Refreshing access token");

        let response = self
            .http_client
            .post(&*self.refresh_url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshFailure::Rejected(format!(
                "refresh endpoint returned status {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let envelope: Envelope<RefreshResponse> = serde_json::from_slice(&body)
            .map_err(|e| RefreshFailure::Rejected(format!("malformed refresh response: {e}")))?;

        if !envelope.is_success() {
            return Err(RefreshFailure::Rejected(format!(
                "refresh rejected with code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let refreshed = envelope
            .data
            .filter(|data| !data.access_token.is_empty())
            .ok_or_else(|| {
                RefreshFailure::Rejected("refresh response carried no access token".to_string())
            })?;

        let pair = TokenPair {
            access_token: Some(refreshed.access_token.clone()),
            refresh_token: refreshed.refresh_token,
        };
        self.token_store
            .set(&pair)
            .map_err(|e| RefreshFailure::Storage(format!("failed to persist tokens: {e}")))?;

        info!(expires_in = refreshed.expires_in, "Access token refreshed successfully");
        Ok(refreshed.access_token)
    }
}
