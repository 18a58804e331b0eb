//! Route guards for client-side navigation

use crate::token_store::TokenStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Not signed in; come back to `return_to` after login
    Login { return_to: String },
    /// Signed in but missing every required permission
    Forbidden,
}

/// Require a stored access token
pub fn require_auth(store: &TokenStore, location: &str) -> RouteDecision {
    if store.is_logged_in() {
        RouteDecision::Allow
    } else {
        RouteDecision::Login {
            return_to: location.to_string(),
        }
    }
}

/// Require any one of `any`; an empty list lets everyone through
pub fn require_permission<S: AsRef<str>>(store: &TokenStore, any: &[S]) -> RouteDecision {
    if store.has_any_permission(any) {
        RouteDecision::Allow
    } else {
        RouteDecision::Forbidden
    }
}

/// Authentication first, then permissions
pub fn guard_route<S: AsRef<str>>(store: &TokenStore, location: &str, any: &[S]) -> RouteDecision {
    match require_auth(store, location) {
        RouteDecision::Allow => require_permission(store, any),
        decision => decision,
    }
}
