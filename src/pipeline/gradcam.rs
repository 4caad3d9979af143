//! Grad-CAM over the classifier's tap layer.
//!
//! Every call captures activations in its own [`Var`], so concurrent requests
//! never see each other's activations or gradients.

use super::preprocess::INPUT_SIZE;
use crate::model::{Classifier, check_input};
use crate::{Error, Result};
use candle_core::{Device, IndexOp, Tensor, Var};
use image::imageops::FilterType;
use image::{ImageBuffer, Luma};
use tracing::debug;

const EPSILON: f32 = 1e-7;

/// Importance weights in [0, 1], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl ActivationMap {
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get((y * self.width + x) as usize).copied()
    }
}

pub struct GradCam {
    output_size: u32,
}

impl Default for GradCam {
    fn default() -> Self {
        Self::new(INPUT_SIZE)
    }
}

impl GradCam {
    pub fn new(output_size: u32) -> Self {
        Self { output_size }
    }

    pub fn explain(
        &self,
        classifier: &Classifier,
        input: &Tensor,
        target_idx: usize,
    ) -> Result<ActivationMap> {
        check_input(input)?;
        let backbone = classifier.backbone();
        let input = input.to_device(classifier.device())?.detach();

        let activations = backbone.features(&input)?.detach();
        let capture = Var::from_tensor(&activations)?;
        let logits = backbone.head(capture.as_tensor())?;

        let (_, classes) = logits.dims2()?;
        if target_idx >= classes {
            return Err(Error::TargetOutOfRange {
                index: target_idx,
                count: classes,
            });
        }

        let grads = logits.i((0, target_idx))?.backward()?;
        let gradients = grads
            .get(capture.as_tensor())
            .ok_or_else(|| Error::MissingGradient {
                layer: backbone.tap_layer().to_string(),
            })?;
        if gradients.abs()?.sum_all()?.to_scalar::<f32>()? == 0.0 {
            return Err(Error::ZeroGradient {
                layer: backbone.tap_layer().to_string(),
            });
        }

        // Channel weights are the spatially averaged gradients.
        let weights = gradients.mean_keepdim((2, 3))?;
        let cam = activations
            .broadcast_mul(&weights)?
            .sum(1)?
            .relu()?
            .squeeze(0)?;
        let (height, width) = cam.dims2()?;
        let raw = cam
            .to_device(&Device::Cpu)?
            .flatten_all()?
            .to_vec1::<f32>()?;

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(Error::model(format!(
                "Activation map for layer '{}' contains non-finite values",
                backbone.tap_layer()
            )));
        }
        debug!(
            "Grad-CAM on {} at {}x{} for target {}",
            backbone.tap_layer(),
            width,
            height,
            target_idx
        );

        self.upsample(normalise(raw), width as u32, height as u32)
    }

    fn upsample(&self, values: Vec<f32>, width: u32, height: u32) -> Result<ActivationMap> {
        let grid: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(width, height, values)
            .ok_or_else(|| Error::internal("Activation grid does not match its dimensions"))?;
        let resized = image::imageops::resize(
            &grid,
            self.output_size,
            self.output_size,
            FilterType::Triangle,
        );

        Ok(ActivationMap {
            width: self.output_size,
            height: self.output_size,
            values: resized
                .into_raw()
                .into_iter()
                .map(|v| v.clamp(0.0, 1.0))
                .collect(),
        })
    }
}

/// Shifts the minimum to zero and scales the maximum to (almost) one.
fn normalise(mut values: Vec<f32>) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    values.iter_mut().for_each(|v| *v -= min);
    let max = values.iter().copied().fold(0.0, f32::max);
    values.iter_mut().for_each(|v| *v /= max + EPSILON);
    values
}
