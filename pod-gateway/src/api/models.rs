//! Request and response bodies.

use serde::{Deserialize, Serialize};

use crate::images::ImageId;

/// Response for a successful image upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub id: ImageId,
    /// Where the image can be fetched, absolute when a public base URL is set.
    pub url: String,
    /// `None` when uploads never expire.
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageQuery {
    /// Notified with `{"id", "status": "delivered"}` once the image was served.
    pub callback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilterResponse {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextPromptRequest {
    pub text: String,
}

/// Stored image plus the vision backend's unmodified answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePromptResponse {
    pub id: ImageId,
    pub url: String,
    pub expires_in_secs: Option<u64>,
    /// Backend JSON as returned, or a string when the body was not JSON.
    pub completion: serde_json::Value,
}
