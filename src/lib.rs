//! Huaan Rust Client
//!
//! A Rust client library for the Huaan appointment-booking API, with
//! persistent token storage, proactive JWT refresh shared between concurrent
//! callers, and a request pipeline that unwraps the `{code, message, data}`
//! envelope and recovers once from an expired session.

pub mod api;
pub mod auth_client;
pub mod classify;
pub mod config;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod permissions;
pub mod pipeline;
pub mod storage;
pub mod token_store;
pub mod types;

pub use auth_client::TokenRefresher;
pub use classify::{Classification, Download, ResponseKind};
pub use config::{AuthSignals, ClientConfig};
pub use error::{ClientError, RefreshFailure, Result};
pub use guard::RouteDecision;
pub use permissions::StoredPermissions;
pub use pipeline::{LogOnlyRedirect, LoginRedirect, Reply, RequestOptions, RequestPipeline};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use token_store::TokenStore;
pub use types::{Envelope, SUCCESS_CODE, TokenPair};
