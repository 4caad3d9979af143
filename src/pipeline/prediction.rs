use crate::labels::{LABELS, NUM_LABELS, label_names};
use crate::{Error, Result};
use serde::Serialize;

/// Scores from one forward pass and the top finding derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub labels: Vec<String>,
    pub scores: Vec<f32>,
    pub top_idx: usize,
    pub top_label: String,
    pub top_score: f32,
}

impl Prediction {
    /// Ties between equal maxima go to the lowest label index.
    pub fn from_scores(scores: Vec<f32>) -> Result<Self> {
        if scores.len() != NUM_LABELS {
            return Err(Error::model(format!(
                "Expected {} scores, got {}",
                NUM_LABELS,
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(Error::model(format!("Score {} is not a probability", bad)));
        }

        let (top_idx, top_score) = scores.iter().copied().enumerate().fold(
            (0, scores[0]),
            |best, (i, score)| if score > best.1 { (i, score) } else { best },
        );

        Ok(Self {
            labels: label_names(),
            top_label: LABELS[top_idx].to_string(),
            top_idx,
            top_score,
            scores,
        })
    }

    /// `(label, score)` pairs, highest score first; ties keep label order.
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .labels
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}
