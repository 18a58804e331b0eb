//! Login, session bootstrap and profile endpoints

use crate::error::{RefreshFailure, Result};
use crate::pipeline::{RequestOptions, RequestPipeline};
use crate::types::{AdminLoginResponse, LoginResponse, TokenPair};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct PasswordLogin<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl RequestPipeline {
    /// Sign in to the admin console and persist the issued token
    pub async fn admin_login(&self, username: &str, password: &str) -> Result<AdminLoginResponse> {
        let login: AdminLoginResponse = self
            .post("/admin/login", &PasswordLogin { username, password })
            .await?;

        self.token_store().set(&TokenPair::access_only(login.token.clone()))?;
        info!(username, "Admin signed in");
        Ok(login)
    }

    /// Patient login with username and password
    pub async fn password_login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let login = self
            .post("/user/login/password", &PasswordLogin { username, password })
            .await?;
        self.store_login(login)
    }

    /// Patient login with a WeChat `wx.login` code
    pub async fn wechat_login(&self, code: &str) -> Result<LoginResponse> {
        let login = self.post("/user/login", &json!({ "code": code })).await?;
        self.store_login(login)
    }

    /// Patient login with a phone number and SMS code
    pub async fn phone_login(&self, phone: &str, code: &str) -> Result<LoginResponse> {
        let login = self
            .post("/user/login/phone", &json!({ "phone": phone, "code": code }))
            .await?;
        self.store_login(login)
    }

    pub async fn send_sms_code(&self, phone: &str) -> Result<Value> {
        self.post("/sms/send", &json!({ "phone": phone })).await
    }

    /// Fetch the signed-in user and cache it
    pub async fn user_info(&self) -> Result<Value> {
        let user: Value = self.get("/user/info", RequestOptions::default()).await?;
        self.token_store().set_user(Some(&user))?;
        Ok(user)
    }

    pub async fn update_user_info(&self, profile: &Value) -> Result<Value> {
        self.put("/user/info", profile).await
    }

    /// Restore the session at startup
    ///
    /// Refreshes the token if needed, then caches the current user. Without
    /// a session the cached user is dropped. Failing to fetch the user is
    /// not fatal; the cached copy is kept.
    pub async fn bootstrap(&self) -> Result<Option<Value>> {
        match self.refresher().ensure_valid().await {
            Ok(_) => {}
            Err(RefreshFailure::Rejected(reason)) => return Err(self.force_logout(&reason, None)),
            Err(failure) => return Err(failure.into()),
        }

        if !self.token_store().is_logged_in() {
            self.token_store().set_user(None)?;
            return Ok(None);
        }

        match self.user_info().await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_auth_failure() => Err(e),
            Err(e) => {
                debug!(error = %e, "Could not fetch user during bootstrap, keeping cached user");
                Ok(self.token_store().user())
            }
        }
    }

    fn store_login(&self, login: LoginResponse) -> Result<LoginResponse> {
        self.token_store().set(&login.token_pair())?;
        self.token_store().set_user(login.user.as_ref())?;
        info!(is_new = login.is_new, "User signed in");
        Ok(login)
    }
}
