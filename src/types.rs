//! Type definitions for authentication and the response envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope code that marks a successful business response
pub const SUCCESS_CODE: i64 = 200000;

/// Authentication tokens (access + refresh)
///
/// Either half may be missing. Empty strings count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: non_empty(access_token.into()),
            refresh_token: non_empty(refresh_token.into()),
        }
    }

    /// Pair carrying only an access token
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: non_empty(access_token.into()),
            refresh_token: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Overlay the non-empty fields of `update` onto `self`
    pub fn merge(&mut self, update: &TokenPair) {
        if let Some(token) = update.access_token.as_deref().filter(|t| !t.is_empty()) {
            self.access_token = Some(token.to_string());
        }
        if let Some(token) = update.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.refresh_token = Some(token.to_string());
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Uniform `{code, message, data}` wrapper returned by the business API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Body of `POST /auth/refresh`
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Data of a successful refresh
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
}

/// Data of a successful patient login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub user: Option<Value>,
    /// Set when the account was created by this login
    #[serde(default)]
    pub is_new: bool,
}

impl LoginResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: non_empty(self.access_token.clone()),
            refresh_token: self.refresh_token.clone().and_then(non_empty),
        }
    }
}

/// Data of a successful admin console login
#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginResponse {
    pub token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub admin: Option<Value>,
}
