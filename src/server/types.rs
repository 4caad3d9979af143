use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub labels: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub labels: Vec<String>,
    pub scores: Vec<f32>,
    pub top_label: String,
    pub top_score: f32,
    pub heatmap_png_base64: String,
    /// Hex-encoded PDF report; the field name is kept for existing clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
