//! Error types for the Huaan client

use thiserror::Error;

/// Client error types
///
/// Every failure of a logical request surfaces as exactly one of these.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure: DNS, connection reset, timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials are missing, were rejected, or could not be refreshed.
    /// The pipeline has already cleared the session when this is returned.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Well-formed response carrying a non-success envelope code
    #[error("{message} (code {code})")]
    Business { code: i64, message: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-2xx status
    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else if err.is_builder() {
            Self::Configuration(format!("invalid request: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl ClientError {
    /// Whether the session was terminated because of this error
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Text suitable for showing to the end user
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error, please check your connection".to_string(),
            Self::Authentication(_) => "Session expired, please sign in again".to_string(),
            Self::Business { message, .. } if !message.is_empty() => message.clone(),
            Self::Business { .. } => "Request failed".to_string(),
            Self::Forbidden(_) => "You do not have permission to access this resource".to_string(),
            Self::NotFound(_) => "The requested resource does not exist".to_string(),
            Self::ServerError { .. } => "Server error, please try again later".to_string(),
            Self::Http { message, .. } if !message.is_empty() => message.clone(),
            _ => "Request failed".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Outcome of a failed refresh, shared by every caller waiting on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The refresh call never got an answer
    Network(String),
    /// The backend answered and refused to issue a new access token
    Rejected(String),
    /// New tokens were issued but could not be saved locally
    Storage(String),
}

impl From<RefreshFailure> for ClientError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Network(msg) => Self::Network(msg),
            RefreshFailure::Rejected(msg) => Self::Authentication(msg),
            RefreshFailure::Storage(msg) => Self::Storage(msg),
        }
    }
}
