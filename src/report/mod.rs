mod pdf;

use crate::labels::display_name;
use crate::pipeline::Prediction;
use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::ImageFormat;
use pdf::{PAGE_HEIGHT, PAGE_WIDTH, Page};
use tracing::debug;

const MARGIN: f32 = 50.0;
const ROW_HEIGHT: f32 = 18.0;
const BAR_WIDTH: f32 = 180.0;
const HEATMAP_SIZE: f32 = 224.0;

const TEXT: [f32; 3] = [0.1, 0.1, 0.1];
const ACCENT: [f32; 3] = [0.75, 0.1, 0.1];
const BAR: [f32; 3] = [0.25, 0.45, 0.75];
const BAR_TRACK: [f32; 3] = [0.9, 0.9, 0.9];

const DISCLAIMER: &str =
    "Generated automatically by a machine learning model. Not a medical diagnosis.";

/// Renders a one-page PDF summary of a prediction.
///
/// Output depends only on the inputs: no timestamps or document IDs are written.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    title: String,
}

impl ReportBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn render(&self, prediction: &Prediction, heatmap_png_base64: &str) -> Result<Vec<u8>> {
        let png = STANDARD.decode(heatmap_png_base64)?;
        let heatmap = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| Error::report(format!("Heatmap is not a valid PNG: {}", e)))?
            .to_rgb8();

        let mut page = Page::default();
        let mut y = PAGE_HEIGHT - MARGIN - 10.0;

        page.fill_colour(TEXT);
        page.text(MARGIN, y, 20.0, true, &self.title);
        y -= 36.0;

        page.fill_colour(ACCENT);
        page.text(
            MARGIN,
            y,
            14.0,
            true,
            &format!(
                "Top finding: {} ({:.1}%)",
                display_name(&prediction.top_label),
                prediction.top_score * 100.0
            ),
        );
        y -= 30.0;

        page.fill_colour(TEXT);
        page.text(MARGIN, y, 12.0, true, "Finding");
        page.text(MARGIN + 170.0, y, 12.0, true, "Probability");
        y -= ROW_HEIGHT;

        for (label, score) in prediction.ranked() {
            let is_top = label == prediction.top_label;
            page.fill_colour(if is_top { ACCENT } else { TEXT });
            page.text(MARGIN, y, 10.0, is_top, &display_name(label));
            page.text(
                MARGIN + 110.0,
                y,
                10.0,
                is_top,
                &format!("{:5.1}%", score * 100.0),
            );

            page.fill_colour(BAR_TRACK);
            page.rect(MARGIN + 170.0, y - 2.0, BAR_WIDTH, 10.0);
            page.fill_colour(if is_top { ACCENT } else { BAR });
            page.rect(MARGIN + 170.0, y - 2.0, BAR_WIDTH * score.clamp(0.0, 1.0), 10.0);
            y -= ROW_HEIGHT;
        }

        y -= 20.0;
        page.fill_colour(TEXT);
        page.text(MARGIN, y, 12.0, true, "Grad-CAM activation map");
        y -= 10.0 + HEATMAP_SIZE;
        page.image((PAGE_WIDTH - HEATMAP_SIZE) / 2.0, y, HEATMAP_SIZE, HEATMAP_SIZE);

        page.text(MARGIN, MARGIN / 2.0, 8.0, false, DISCLAIMER);

        let bytes = page.into_pdf(&heatmap)?;
        debug!("Rendered {} byte report", bytes.len());
        Ok(bytes)
    }
}
