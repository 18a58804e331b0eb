//! Client configuration

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recognizers that mark a response as an authentication failure
///
/// The admin backend signals an expired session with HTTP 401. The
/// mini-program backend may also answer 2xx with an envelope code starting
/// with `401`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSignals {
    /// HTTP status 401 triggers one refresh-and-retry
    #[serde(default = "default_true")]
    pub http_status: bool,
    /// Envelope codes whose decimal form starts with "401" end the session
    #[serde(default)]
    pub business_code_prefix: bool,
}

impl AuthSignals {
    pub fn admin() -> Self {
        Self {
            http_status: true,
            business_code_prefix: false,
        }
    }

    pub fn mini_program() -> Self {
        Self {
            http_status: true,
            business_code_prefix: true,
        }
    }
}

impl Default for AuthSignals {
    fn default() -> Self {
        Self::admin()
    }
}

/// Configuration for the request pipeline and token refresher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API base URL; relative request paths are joined onto it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout applied to every transport call
    /// Default: 10 seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Refresh when the access token expires within this many seconds
    /// Default: 60 seconds
    #[serde(default = "default_refresh_before_expiry_secs")]
    pub refresh_before_expiry_secs: u64,

    /// Path of the refresh endpoint, relative to `base_url`
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Client route the forced logout navigates to
    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default)]
    pub auth_signals: AuthSignals,

    /// Session file; the platform data directory is used when unset
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Background refresh check interval; disabled when unset
    #[serde(default)]
    pub auto_refresh_interval_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_refresh_before_expiry_secs() -> u64 {
    60
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            refresh_before_expiry_secs: default_refresh_before_expiry_secs(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            auth_signals: AuthSignals::default(),
            storage_path: None,
            auto_refresh_interval_secs: None,
        }
    }
}

impl ClientConfig {
    /// Settings of the admin console: bearer token, HTTP 401 only
    pub fn admin(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_signals: AuthSignals::admin(),
            ..Self::default()
        }
    }

    /// Settings of the patient mini-program
    pub fn mini_program(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login_path: "/pages/login/index".to_string(),
            auth_signals: AuthSignals::mini_program(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load configuration from the usual file locations and the environment
    ///
    /// Environment variables use the `HUAAN_CLIENT` prefix and `__` as the
    /// nesting separator, e.g. `HUAAN_CLIENT__AUTH_SIGNALS__HTTP_STATUS`.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        for path in ["huaan-client.toml", "config/huaan-client.toml"] {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HUAAN_CLIENT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("HUAAN_CLIENT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
