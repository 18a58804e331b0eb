//! Typed wrappers over the booking API endpoints
//!
//! Each submodule adds methods to [`RequestPipeline`](crate::RequestPipeline),
//! so every call gets token refresh and envelope handling. Entity payloads
//! are returned as `serde_json::Value`; their shape belongs to the backend.

pub mod admin;
pub mod auth;
pub mod booking;
