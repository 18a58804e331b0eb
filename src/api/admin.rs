//! Admin console endpoints that go beyond plain CRUD

use crate::classify::Download;
use crate::error::Result;
use crate::permissions::{MyPermissionsResponse, StoredPermissions};
use crate::pipeline::{RequestOptions, RequestPipeline};
use serde_json::{Value, json};
use tracing::debug;

impl RequestPipeline {
    /// Fetch the signed-in admin's permissions and cache them
    pub async fn refresh_my_permissions(&self) -> Result<StoredPermissions> {
        let resp: MyPermissionsResponse = self
            .get("/admin/permissions/me", RequestOptions::default())
            .await?;

        let snapshot = StoredPermissions::from(resp);
        self.token_store().set_permissions(&snapshot)?;
        debug!(
            is_super_admin = snapshot.is_super_admin,
            count = snapshot.permissions.len(),
            "Permission snapshot cached"
        );
        Ok(snapshot)
    }

    /// Export appointments as a spreadsheet
    pub async fn export_appointments(&self, status: Option<&str>) -> Result<Download> {
        self.download(
            "/admin/appointments/export",
            RequestOptions::default().query_opt("status", status),
        )
        .await
    }

    pub async fn update_appointment_status(&self, id: i64, status: &str) -> Result<Value> {
        self.put(&format!("/admin/appointments/{id}"), &json!({ "status": status }))
            .await
    }
}
