use super::types::{ErrorResponse, HealthResponse, PredictResponse, RootResponse};
use crate::labels::NUM_LABELS;
use crate::pipeline::{PredictOutcome, Predictor};
use crate::{Error, Result};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, detail: impl Into<String>) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        message: "Chest X-Ray Classifier API".to_string(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: state.predictor.classifier().model_name().to_string(),
        labels: NUM_LABELS,
    })
}

pub async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> std::result::Result<Json<PredictResponse>, Rejection> {
    let request_id = Uuid::new_v4();
    let (content_type, bytes) = read_upload(multipart).await?;

    info!(
        "Prediction request {}: {} bytes of {}",
        request_id,
        bytes.len(),
        content_type.as_deref().unwrap_or("unknown type")
    );

    if !content_type.as_deref().is_some_and(is_image) {
        warn!("Prediction request {} rejected: not an image", request_id);
        return Err(reject(StatusCode::BAD_REQUEST, "File must be an image"));
    }

    match run_prediction(state.predictor.clone(), bytes).await {
        Ok(outcome) => Ok(Json(into_response(outcome))),
        Err(e) => {
            error!("Prediction request {} failed: {}", request_id, e);
            Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prediction failed: {}", e),
            ))
        }
    }
}

/// Returns the declared content type and body of the first `file` field.
async fn read_upload(
    mut multipart: Multipart,
) -> std::result::Result<(Option<String>, Bytes), Rejection> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| reject(e.status(), format!("Invalid multipart body: {}", e)))?;

        let Some(field) = field else {
            return Err(reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Missing file upload",
            ));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| reject(e.status(), format!("Invalid upload: {}", e)))?;
        return Ok((content_type, bytes));
    }
}

fn is_image(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

async fn run_prediction(predictor: Arc<Predictor>, bytes: Bytes) -> Result<PredictOutcome> {
    tokio::task::spawn_blocking(move || predictor.predict(&bytes))
        .await
        .map_err(|e| Error::internal(format!("Prediction task failed: {}", e)))?
}

fn into_response(outcome: PredictOutcome) -> PredictResponse {
    let PredictOutcome {
        prediction,
        heatmap_png_base64,
        report_pdf,
    } = outcome;

    PredictResponse {
        labels: prediction.labels,
        scores: prediction.scores,
        top_label: prediction.top_label,
        top_score: prediction.top_score,
        heatmap_png_base64,
        pdf_base64: report_pdf.map(hex::encode),
    }
}
