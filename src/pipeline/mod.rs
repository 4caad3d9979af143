pub mod gradcam;
pub mod overlay;
pub mod preprocess;
mod prediction;

pub use gradcam::{ActivationMap, GradCam};
pub use prediction::Prediction;
pub use preprocess::{INPUT_SIZE, PreparedImage, decode, prepare};

use crate::model::Classifier;
use crate::report::ReportBuilder;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything produced for one upload.
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub prediction: Prediction,
    pub heatmap_png_base64: String,
    pub report_pdf: Option<Vec<u8>>,
}

/// Runs uploads through preprocessing, classification, Grad-CAM and the
/// optional report. Holds no per-request state.
pub struct Predictor {
    classifier: Arc<Classifier>,
    gradcam: GradCam,
    report: Option<ReportBuilder>,
}

impl Predictor {
    pub fn new(classifier: Arc<Classifier>, report: Option<ReportBuilder>) -> Self {
        Self {
            classifier,
            gradcam: GradCam::default(),
            report,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn predict(&self, bytes: &[u8]) -> Result<PredictOutcome> {
        let started = Instant::now();

        let image = decode(bytes)?;
        let prepared = prepare(&image, self.classifier.device())?;

        let scores = self.classifier.infer(&prepared.tensor)?;
        let prediction = Prediction::from_scores(scores)?;
        debug!(
            "Top finding {} ({:.4}) after {:?}",
            prediction.top_label,
            prediction.top_score,
            started.elapsed()
        );

        let map = self
            .gradcam
            .explain(&self.classifier, &prepared.tensor, prediction.top_idx)?;
        let heatmap_png_base64 = overlay::render_base64(&prepared.rgb, &map)?;

        let report_pdf = match &self.report {
            Some(builder) => Some(builder.render(&prediction, &heatmap_png_base64)?),
            None => None,
        };

        info!(
            "Prediction complete: {} ({:.4}) in {:?}",
            prediction.top_label,
            prediction.top_score,
            started.elapsed()
        );

        Ok(PredictOutcome {
            prediction,
            heatmap_png_base64,
            report_pdf,
        })
    }
}
