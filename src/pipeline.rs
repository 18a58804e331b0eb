//! Authenticated request pipeline
//!
//! One logical call goes through: token check, send, classify, and at most
//! one refresh-and-retry when the backend answers HTTP 401.

use crate::auth_client::TokenRefresher;
use crate::classify::{AuthSignal, Classification, Download, RawResponse, ResponseKind, classify};
use crate::config::{AuthSignals, ClientConfig};
use crate::error::{ClientError, RefreshFailure, Result};
use crate::token_store::TokenStore;
use reqwest::{Client, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Navigation performed by a forced logout
pub trait LoginRedirect: Send + Sync + 'static {
    /// Send the user to the login entry point
    ///
    /// # Arguments
    /// * `login_path` - Configured login route
    /// * `return_to` - Location to come back to after signing in, if known
    fn to_login(&self, login_path: &str, return_to: Option<&str>);
}

/// Redirect that only logs; for headless clients
pub struct LogOnlyRedirect;

impl LoginRedirect for LogOnlyRedirect {
    fn to_login(&self, login_path: &str, return_to: Option<&str>) {
        info!(login_path, return_to, "Session ended, sign-in required");
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub response: ResponseKind,
    /// Location passed to the login redirect if this call ends the session
    pub return_to: Option<String>,
}

impl RequestOptions {
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add the query parameter only when a value is present
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn binary(mut self) -> Self {
        self.response = ResponseKind::Binary;
        self
    }

    pub fn return_to(mut self, location: impl Into<String>) -> Self {
        self.return_to = Some(location.into());
        self
    }
}

/// Successful result of a call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Unwrapped envelope `data`
    Data(Value),
    Download(Download),
}

/// Request pipeline with credential attachment and 401 recovery
pub struct RequestPipeline {
    http_client: Client,
    base_url: String,
    auth_signals: AuthSignals,
    login_path: String,
    refresher: Arc<TokenRefresher>,
    redirect: Arc<dyn LoginRedirect>,
}

impl RequestPipeline {
    /// Create a pipeline and its refresher over `token_store`
    ///
    /// Starts the background refresh task when the configuration enables it,
    /// which requires a running tokio runtime.
    pub fn new(
        config: ClientConfig,
        token_store: TokenStore,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Arc<Self>> {
        if config.base_url.is_empty() {
            return Err(ClientError::Configuration("base_url is required".into()));
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("huaan-rs-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let refresher = Arc::new(TokenRefresher::new(&config, token_store, http_client.clone()));

        if let Some(secs) = config.auto_refresh_interval_secs.filter(|s| *s > 0) {
            refresher.spawn_auto_refresh(std::time::Duration::from_secs(secs));
        }

        Ok(Arc::new(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_signals: config.auth_signals,
            login_path: config.login_path,
            refresher,
            redirect,
        }))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &TokenStore {
        self.refresher.token_store()
    }

    pub fn refresher(&self) -> &Arc<TokenRefresher> {
        &self.refresher
    }

    /// Perform one logical request
    ///
    /// Returns the unwrapped envelope data or the downloaded file. Any
    /// failure is returned; an authentication failure has already cleared
    /// the session and redirected to the login entry point.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Reply> {
        let url = build_url(&self.base_url, path);
        let headers = header_map(&options.headers)?;

        let token = match self.refresher.ensure_valid().await {
            Ok(token) => token,
            Err(RefreshFailure::Rejected(reason)) => {
                return Err(self.force_logout(&reason, options.return_to.as_deref()));
            }
            Err(failure) => return Err(failure.into()),
        };

        let response = self
            .dispatch(&method, &url, body.as_ref(), &options, &headers, token.as_deref())
            .await?;

        let classification = match classify(&response, options.response, &self.auth_signals) {
            Classification::Unauthorized(AuthSignal::HttpStatus) => {
                debug!(%method, %url, "Received 401, refreshing and retrying once");
                let fresh = self.refresh_after_401(token.as_deref(), &options).await?;
                let retried = self
                    .dispatch(&method, &url, body.as_ref(), &options, &headers, Some(&fresh))
                    .await?;
                match classify(&retried, options.response, &self.auth_signals) {
                    Classification::Unauthorized(_) => {
                        return Err(self.force_logout(
                            "request still unauthorized after refresh",
                            options.return_to.as_deref(),
                        ));
                    }
                    other => other,
                }
            }
            other => other,
        };

        self.finish(classification, &options)
    }

    async fn refresh_after_401(&self, rejected: Option<&str>, options: &RequestOptions) -> Result<String> {
        match self.refresher.force_refresh(rejected).await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(self.force_logout("no refresh token available", options.return_to.as_deref())),
            Err(RefreshFailure::Rejected(reason)) => Err(self.force_logout(&reason, options.return_to.as_deref())),
            Err(failure) => Err(failure.into()),
        }
    }

    fn finish(&self, classification: Classification, options: &RequestOptions) -> Result<Reply> {
        match classification {
            Classification::Success(data) => Ok(Reply::Data(data)),
            Classification::Download(download) => Ok(Reply::Download(download)),
            Classification::Unauthorized(AuthSignal::BusinessCode { code, message }) => {
                debug!(code, "Business code reports an authentication failure");
                Err(self.force_logout(&message, options.return_to.as_deref()))
            }
            Classification::Unauthorized(AuthSignal::HttpStatus) => Err(self.force_logout(
                "request unauthorized",
                options.return_to.as_deref(),
            )),
            Classification::Business { code, message } => {
                debug!(code, message = %message, "Business failure");
                Err(ClientError::Business { code, message })
            }
            Classification::Forbidden(message) => Err(ClientError::Forbidden(message)),
            Classification::NotFound(message) => Err(ClientError::NotFound(message)),
            Classification::ServerError { status, message } => {
                warn!(status, message = %message, "Server error");
                Err(ClientError::ServerError { status, message })
            }
            Classification::HttpError { status, message } => Err(ClientError::Http { status, message }),
            Classification::Malformed(reason) => Err(ClientError::InvalidResponse(reason)),
        }
    }

    /// Issue one transport call
    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        headers: &header::HeaderMap,
        token: Option<&str>,
    ) -> Result<RawResponse> {
        let mut request = self.http_client.request(method.clone(), url);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if !headers.is_empty() {
            request = request.headers(headers.clone());
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "Transport failure");
            ClientError::from(e)
        })?;

        let status = response.status().as_u16();
        let content_type = header_value(response.headers(), header::CONTENT_TYPE);
        let content_disposition = header_value(response.headers(), header::CONTENT_DISPOSITION);
        let body = response.bytes().await?;

        debug!(%method, %url, status, bytes = body.len(), "Response received");

        Ok(RawResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }

    /// Clear the session and redirect to the login entry point
    ///
    /// Returns the error the failed call reports.
    pub(crate) fn force_logout(&self, reason: &str, return_to: Option<&str>) -> ClientError {
        warn!(reason, "Forcing logout");
        if let Err(e) = self.token_store().clear() {
            error!(error = %e, "Failed to clear session during forced logout");
        }
        self.redirect.to_login(&self.login_path, return_to);
        ClientError::Authentication(reason.to_string())
    }

    /// Explicit logout requested by the user
    pub fn logout(&self) -> Result<()> {
        self.token_store().clear()?;
        self.redirect.to_login(&self.login_path, None);
        info!("Logged out");
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        match self.send(method, path, body, options).await? {
            Reply::Data(data) => Ok(serde_json::from_value(data)?),
            Reply::Download(_) => Err(ClientError::InvalidResponse(
                "expected JSON data, got a download".to_string(),
            )),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        self.send_json(Method::GET, path, None, options).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send_json(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send_json(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    /// Download a file; a JSON error body is reported as a business failure
    pub async fn download(&self, path: &str, options: RequestOptions) -> Result<Download> {
        match self.send(Method::GET, path, None, options.binary()).await? {
            Reply::Download(download) => Ok(download),
            Reply::Data(_) => Err(ClientError::InvalidResponse(
                "expected a download, got JSON data".to_string(),
            )),
        }
    }
}

/// Caller-supplied headers, rejected before anything is sent
fn header_map(headers: &[(String, String)]) -> Result<header::HeaderMap> {
    let mut map = header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::Configuration(format!("invalid header name {name:?}: {e}")))?;
        let value = header::HeaderValue::from_str(value)
            .map_err(|e| ClientError::Configuration(format!("invalid value for header {name}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn header_value(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Join `path` onto `base_url`; absolute URLs pass through
pub fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
