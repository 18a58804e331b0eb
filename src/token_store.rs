//! Persistent token and session snapshot storage

use crate::error::Result;
use crate::permissions::StoredPermissions;
use crate::storage::{KeyValueStorage, MemoryStorage};
use crate::types::TokenPair;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Storage key of the token pair
pub const TOKENS_KEY: &str = "auth_tokens";
/// Storage key of the cached user object
pub const USER_KEY: &str = "user";
/// Storage key of the cached permission snapshot
pub const PERMISSIONS_KEY: &str = "permissions";

/// Token store shared by the refresher and the request pipeline
///
/// Clones share the same backing storage. Reads are snapshots: writers hold
/// the store's write lock for the whole update, so `clear()` never shows a
/// half-cleared session to a concurrent reader.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    lock: Arc<RwLock<()>>,
}

impl TokenStore {
    /// Create a token store over the given storage backend
    pub fn new(storage: impl KeyValueStorage) -> Self {
        Self::from_arc(Arc::new(storage))
    }

    pub fn from_arc(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Create a token store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Current token pair; empty when never set or unreadable
    pub fn get(&self) -> TokenPair {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.read_tokens()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get().refresh_token
    }

    /// Store the non-empty fields of `pair`, leaving the others untouched
    pub fn set(&self, pair: &TokenPair) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut stored = self.read_tokens();
        stored.merge(pair);
        self.storage.set(TOKENS_KEY, serde_json::to_string(&stored)?)
    }

    /// Remove both tokens, the cached user and the permission snapshot
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.storage
            .remove_many(&[TOKENS_KEY, USER_KEY, PERMISSIONS_KEY])?;
        debug!("Session cleared");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.access_token().is_some()
    }

    /// Cached user object, if any
    pub fn user(&self) -> Option<Value> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let raw = self.storage.get(USER_KEY)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Null) => None,
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Cached user is corrupt, ignoring");
                None
            }
        }
    }

    /// Cache the user object; `None` removes it
    pub fn set_user(&self, user: Option<&Value>) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        match user {
            Some(user) if !user.is_null() => self.storage.set(USER_KEY, serde_json::to_string(user)?),
            _ => self.storage.remove(USER_KEY),
        }
    }

    /// Cached permission snapshot; malformed entries read as absent
    pub fn permissions(&self) -> Option<StoredPermissions> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let raw = self.storage.get(PERMISSIONS_KEY)?;
        let parsed = StoredPermissions::from_stored(&raw);
        if parsed.is_none() {
            warn!("Cached permission snapshot is malformed, ignoring");
        }
        parsed
    }

    pub fn set_permissions(&self, snapshot: &StoredPermissions) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.storage
            .set(PERMISSIONS_KEY, serde_json::to_string(snapshot)?)
    }

    pub fn clear_permissions(&self) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.storage.remove(PERMISSIONS_KEY)
    }

    /// Whether the cached snapshot grants `code`; false without a snapshot
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions().is_some_and(|p| p.grants(code))
    }

    /// Whether the cached snapshot grants any of `codes`
    ///
    /// An empty list is always granted. Without a snapshot any non-empty
    /// list is denied.
    pub fn has_any_permission<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        if codes.is_empty() {
            return true;
        }
        self.permissions().is_some_and(|p| p.grants_any(codes))
    }

    fn read_tokens(&self) -> TokenPair {
        let Some(raw) = self.storage.get(TOKENS_KEY) else {
            return TokenPair::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Stored token pair is corrupt, treating as absent");
            TokenPair::default()
        })
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
