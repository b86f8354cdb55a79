use crate::color::{ProbedColor, TextColorDecision};
use crate::imaging::{AspectRatio, CropRect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A picked or captured photo, base64-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoRequest {
    pub data: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoPreview {
    pub generation: u64,
    pub source_uri: String,
    pub source_width: u32,
    pub source_height: u32,
    pub aspect: AspectRatio,
    pub crop: CropRect,
    /// In cropped-image coordinates.
    pub analysis: CropRect,
    pub color: ProbedColor,
    pub luminance: f64,
    pub text_color: TextColorDecision,
    pub text_css: &'static str,
    pub local_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAdRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub plan_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user_id: Option<u64>,
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
}
