use super::densenet::{DenseNet, DenseNetConfig, TAP_LAYER};
use super::weights::ensure_weights;
use crate::config::{DeviceKind, ModelConfig};
use crate::labels::NUM_LABELS;
use crate::{Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use std::path::Path;
use tracing::info;

/// A network split at the layer used for activation maps.
pub trait Backbone: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the layer whose output `features` returns.
    fn tap_layer(&self) -> &str;

    /// Runs the network up to and including the tap layer: `(1, C, H, W)`.
    fn features(&self, xs: &Tensor) -> candle_core::Result<Tensor>;

    /// Runs the rest of the network on a tap-layer output: `(1, NUM_LABELS)` logits.
    fn head(&self, features: &Tensor) -> candle_core::Result<Tensor>;

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.head(&self.features(xs)?)
    }
}

impl Backbone for DenseNet {
    fn name(&self) -> &str {
        DenseNet::name(self)
    }

    fn tap_layer(&self) -> &str {
        TAP_LAYER
    }

    fn features(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        DenseNet::features(self, xs)
    }

    fn head(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        DenseNet::head(self, features)
    }
}

/// Multi-label classifier over [`crate::labels::LABELS`].
///
/// Built once at startup and shared read-only between requests.
pub struct Classifier {
    backbone: Box<dyn Backbone>,
    device: Device,
}

impl Classifier {
    /// Resolves the weights (downloading them on first use) and builds the
    /// configured architecture on the selected device.
    pub async fn load(config: &ModelConfig) -> Result<Self> {
        let device = select_device(config.device)?;
        info!("Using device: {:?}", device);

        let weights = ensure_weights(config).await?;
        let dense_config = DenseNetConfig::for_architecture(config.architecture);
        let classifier = Self::from_weights_file(&weights, &dense_config, device)?;

        info!(
            "Loaded {} from {}",
            classifier.model_name(),
            weights.display()
        );
        Ok(classifier)
    }

    pub fn from_weights_file(
        path: impl AsRef<Path>,
        config: &DenseNetConfig,
        device: Device,
    ) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path.as_ref(), &device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let network = DenseNet::load(config, NUM_LABELS, vb)?;
        Ok(Self::from_backbone(network, device))
    }

    pub fn from_backbone(backbone: impl Backbone + 'static, device: Device) -> Self {
        Self {
            backbone: Box::new(backbone),
            device,
        }
    }

    pub fn backbone(&self) -> &dyn Backbone {
        self.backbone.as_ref()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn model_name(&self) -> &str {
        self.backbone.name()
    }

    /// Per-label probabilities for a `(1, 3, H, W)` input.
    ///
    /// Sigmoid, not softmax: findings are independent and can co-occur.
    pub fn infer(&self, input: &Tensor) -> Result<Vec<f32>> {
        check_input(input)?;

        let logits = self
            .backbone
            .forward(&input.to_device(&self.device)?.detach())?
            .detach();
        let scores = candle_nn::ops::sigmoid(&logits)?
            .flatten_all()?
            .to_device(&Device::Cpu)?
            .to_vec1::<f32>()?;

        if scores.len() != NUM_LABELS {
            return Err(Error::model(format!(
                "Classifier produced {} scores, expected {}",
                scores.len(),
                NUM_LABELS
            )));
        }
        Ok(scores)
    }
}

pub(crate) fn check_input(input: &Tensor) -> Result<()> {
    match input.dims() {
        [1, 3, height, width] if *height > 0 && *width > 0 => Ok(()),
        dims => Err(Error::invalid_input(format!(
            "Expected an image tensor of shape (1, 3, H, W), got {:?}",
            dims
        ))),
    }
}

pub fn select_device(kind: DeviceKind) -> Result<Device> {
    let device = match kind {
        DeviceKind::Auto => Device::cuda_if_available(0)?,
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0)?,
    };
    Ok(device)
}
