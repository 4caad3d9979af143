use candle_core::{Device, Tensor};
use xray_classifier::{labels::NUM_LABELS, model::Backbone};

/// Backbone whose logits do not depend on the tap layer, so no gradient can
/// flow back to it.
pub struct DetachedHeadBackbone {
    pub logits: [f32; NUM_LABELS],
}

impl Default for DetachedHeadBackbone {
    fn default() -> Self {
        let mut logits = [-2.0; NUM_LABELS];
        logits[3] = 1.5;
        Self { logits }
    }
}

impl Backbone for DetachedHeadBackbone {
    fn name(&self) -> &str {
        "detached-head"
    }

    fn tap_layer(&self) -> &str {
        "pool"
    }

    fn features(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.avg_pool2d(32)
    }

    fn head(&self, _features: &Tensor) -> candle_core::Result<Tensor> {
        Tensor::new(&[self.logits], &Device::Cpu)
    }
}

/// Backbone that fails every forward pass.
pub struct FailingBackbone {
    pub message: String,
}

impl FailingBackbone {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Backbone for FailingBackbone {
    fn name(&self) -> &str {
        "failing"
    }

    fn tap_layer(&self) -> &str {
        "none"
    }

    fn features(&self, _xs: &Tensor) -> candle_core::Result<Tensor> {
        Err(candle_core::Error::Msg(self.message.clone()))
    }

    fn head(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        Ok(features.clone())
    }
}

/// Backbone whose tap activations are strictly negative and pass through a
/// ReLU, so the gradient reaches the tap layer but is zero everywhere.
pub struct DeadReluBackbone;

impl Backbone for DeadReluBackbone {
    fn name(&self) -> &str {
        "dead-relu"
    }

    fn tap_layer(&self) -> &str {
        "pool"
    }

    fn features(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.avg_pool2d(32)?.abs()?.affine(-1.0, -1.0)
    }

    fn head(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        features
            .relu()?
            .mean((2, 3))?
            .sum_keepdim(1)?
            .broadcast_as((1, NUM_LABELS))
    }
}
