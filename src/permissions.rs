//! Cached permission snapshot used for client-side gating
//!
//! Not a security boundary; the backend re-checks every call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPermissions {
    pub is_super_admin: bool,
    pub permissions: BTreeSet<String>,
}

impl StoredPermissions {
    pub fn new<I, S>(is_super_admin: bool, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_super_admin,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a persisted snapshot
    ///
    /// Returns `None` for non-JSON input or when the `permissions` array is
    /// missing. Non-string entries are dropped. `isSuperAdmin` is read
    /// loosely: any truthy value (`1`, `"yes"`, an object) counts.
    pub fn from_stored(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let permissions = value.get("permissions")?.as_array()?;

        Some(Self {
            is_super_admin: value.get("isSuperAdmin").is_some_and(truthy),
            permissions: permissions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
        })
    }

    pub fn grants(&self, code: &str) -> bool {
        self.is_super_admin || self.permissions.contains(code)
    }

    /// True when any of `codes` is granted. An empty list means no restriction.
    pub fn grants_any<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        if codes.is_empty() || self.is_super_admin {
            return true;
        }
        codes.iter().any(|c| self.permissions.contains(c.as_ref()))
    }
}

/// False only for `false`, `null`, zero, NaN and the empty string
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Data of `GET /admin/permissions/me`
#[derive(Debug, Clone, Deserialize)]
pub struct MyPermissionsResponse {
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl From<MyPermissionsResponse> for StoredPermissions {
    fn from(resp: MyPermissionsResponse) -> Self {
        Self::new(resp.is_super_admin, resp.permissions)
    }
}
