//! Patient-facing booking endpoints

use crate::error::Result;
use crate::pipeline::{RequestOptions, RequestPipeline};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Body of `POST /appointments`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointment {
    /// One-shot token from [`RequestPipeline::idempotent_token`]
    pub idempotent_token: String,
    pub schedule_id: i64,
    pub patient_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptom: Option<String>,
}

/// Data of `GET /token/idempotent`
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotentToken {
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Filters of the schedule listings; dates are `YYYY-MM-DD`
#[derive(Debug, Clone, Default)]
pub struct ScheduleQuery {
    pub doctor_id: Option<i64>,
    pub department_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ScheduleQuery {
    fn options(&self) -> RequestOptions {
        RequestOptions::default()
            .query_opt("doctor_id", self.doctor_id)
            .query_opt("department_id", self.department_id)
            .query_opt("start_date", self.start_date.as_deref())
            .query_opt("end_date", self.end_date.as_deref())
    }
}

impl RequestPipeline {
    /// Fetch a token that makes the next appointment creation idempotent
    pub async fn idempotent_token(&self) -> Result<IdempotentToken> {
        self.get("/token/idempotent", RequestOptions::default()).await
    }

    pub async fn create_appointment(&self, request: &CreateAppointment) -> Result<Value> {
        self.post("/appointments", request).await
    }

    pub async fn list_appointments(&self, status: Option<&str>) -> Result<Value> {
        self.get("/appointments", RequestOptions::default().query_opt("status", status))
            .await
    }

    pub async fn get_appointment(&self, id: i64) -> Result<Value> {
        self.get(&format!("/appointments/{id}"), RequestOptions::default())
            .await
    }

    pub async fn cancel_appointment(&self, id: i64, reason: &str) -> Result<Value> {
        self.put(&format!("/appointments/{id}/cancel"), &json!({ "reason": reason }))
            .await
    }

    pub async fn checkin_appointment(&self, id: i64) -> Result<Value> {
        self.post(&format!("/appointments/{id}/checkin"), &json!({}))
            .await
    }

    /// Bookable schedules matching the filters
    pub async fn list_available_schedules(&self, query: &ScheduleQuery) -> Result<Value> {
        self.get("/schedule/available", query.options()).await
    }

    /// Schedules of one doctor; `department_id` is ignored
    pub async fn list_doctor_schedules(&self, query: &ScheduleQuery) -> Result<Value> {
        let query = ScheduleQuery {
            department_id: None,
            ..query.clone()
        };
        self.get("/schedule", query.options()).await
    }

    pub async fn list_doctors(&self, department_id: Option<i64>, keyword: Option<&str>) -> Result<Value> {
        let options = RequestOptions::default()
            .query_opt("department_id", department_id)
            .query_opt("keyword", keyword);
        self.get("/doctors", options).await
    }

    pub async fn get_doctor(&self, id: i64) -> Result<Value> {
        self.get(&format!("/doctors/{id}"), RequestOptions::default())
            .await
    }

    pub async fn list_patients(&self) -> Result<Value> {
        self.get("/user/patients", RequestOptions::default()).await
    }

    pub async fn get_patient(&self, id: i64) -> Result<Value> {
        self.get(&format!("/user/patients/{id}"), RequestOptions::default())
            .await
    }

    pub async fn create_patient(&self, patient: &Value) -> Result<Value> {
        self.post("/user/patients", patient).await
    }

    pub async fn update_patient(&self, id: i64, patient: &Value) -> Result<Value> {
        self.put(&format!("/user/patients/{id}"), patient).await
    }

    pub async fn delete_patient(&self, id: i64) -> Result<Value> {
        self.delete(&format!("/user/patients/{id}")).await
    }

    pub async fn list_records(&self) -> Result<Value> {
        self.get("/records", RequestOptions::default()).await
    }

    pub async fn get_record(&self, id: i64) -> Result<Value> {
        self.get(&format!("/records/{id}"), RequestOptions::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_query_skips_missing_filters() {
        let query = ScheduleQuery {
            doctor_id: Some(3),
            start_date: Some("2026-10-16".to_string()),
            ..ScheduleQuery::default()
        };

        assert_eq!(
            query.options().query,
            vec![
                ("doctor_id".to_string(), "3".to_string()),
                ("start_date".to_string(), "2026-10-16".to_string()),
            ]
        );
    }

    #[test]
    fn test_create_appointment_omits_empty_symptom() {
        let body = serde_json::to_value(CreateAppointment {
            idempotent_token: "t".to_string(),
            schedule_id: 1,
            patient_id: 2,
            symptom: None,
        })
        .unwrap();
        assert!(body.get("symptom").is_none());
    }
}
