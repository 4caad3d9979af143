//! DenseNet backbone with torchvision parameter names.
//!
//! The forward pass is split at `features.norm5` so the explainer can tap the
//! last feature map: `features` runs everything up to and including `norm5`,
//! `head` applies ReLU, global average pooling and the classifier.

use crate::config::Architecture;
use crate::{Error, Result};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{
    BatchNorm, Conv2d, Conv2dConfig, Linear, VarBuilder, VarMap, batch_norm, conv2d_no_bias,
    linear,
};
use tracing::{debug, warn};

const BN_EPS: f64 = 1e-5;

pub const TAP_LAYER: &str = "features.norm5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseNetConfig {
    pub growth_rate: usize,
    pub block_config: Vec<usize>,
    pub num_init_features: usize,
    pub bn_size: usize,
}

impl DenseNetConfig {
    pub fn densenet121() -> Self {
        Self {
            growth_rate: 32,
            block_config: vec![6, 12, 24, 16],
            num_init_features: 64,
            bn_size: 4,
        }
    }

    pub fn densenet169() -> Self {
        Self {
            block_config: vec![6, 12, 32, 32],
            ..Self::densenet121()
        }
    }

    pub fn densenet201() -> Self {
        Self {
            block_config: vec![6, 12, 48, 32],
            ..Self::densenet121()
        }
    }

    pub fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::Densenet121 => Self::densenet121(),
            Architecture::Densenet169 => Self::densenet169(),
            Architecture::Densenet201 => Self::densenet201(),
        }
    }

    /// Channel count of the `norm5` feature map.
    pub fn num_features(&self) -> usize {
        let last = self.block_config.len().saturating_sub(1);
        self.block_config
            .iter()
            .enumerate()
            .fold(self.num_init_features, |features, (i, layers)| {
                let grown = features + layers * self.growth_rate;
                if i == last { grown } else { grown / 2 }
            })
    }

    fn validate(&self) -> Result<()> {
        if self.block_config.is_empty() || self.growth_rate == 0 || self.bn_size == 0 {
            return Err(Error::model(format!(
                "Invalid DenseNet configuration: {:?}",
                self
            )));
        }
        Ok(())
    }
}

struct DenseLayer {
    norm1: BatchNorm,
    conv1: Conv2d,
    norm2: BatchNorm,
    conv2: Conv2d,
}

impl DenseLayer {
    fn new(in_channels: usize, growth_rate: usize, bn_size: usize, vb: VarBuilder) -> Result<Self> {
        let bottleneck = bn_size * growth_rate;
        Ok(Self {
            norm1: batch_norm(in_channels, BN_EPS, vb.pp("norm1"))?,
            conv1: conv2d_no_bias(
                in_channels,
                bottleneck,
                1,
                Conv2dConfig::default(),
                vb.pp("conv1"),
            )?,
            norm2: batch_norm(bottleneck, BN_EPS, vb.pp("norm2"))?,
            conv2: conv2d_no_bias(
                bottleneck,
                growth_rate,
                3,
                Conv2dConfig {
                    padding: 1,
                    ..Default::default()
                },
                vb.pp("conv2"),
            )?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.apply_t(&self.norm1, false)?
            .relu()?
            .apply(&self.conv1)?
            .apply_t(&self.norm2, false)?
            .relu()?
            .apply(&self.conv2)
    }
}

struct DenseBlock {
    layers: Vec<DenseLayer>,
}

impl DenseBlock {
    fn new(
        num_layers: usize,
        in_channels: usize,
        growth_rate: usize,
        bn_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let layers = (0..num_layers)
            .map(|i| {
                DenseLayer::new(
                    in_channels + i * growth_rate,
                    growth_rate,
                    bn_size,
                    vb.pp(format!("denselayer{}", i + 1)),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut features = xs.clone();
        for layer in &self.layers {
            let new_features = layer.forward(&features)?;
            features = Tensor::cat(&[&features, &new_features], 1)?;
        }
        Ok(features)
    }
}

struct Transition {
    norm: BatchNorm,
    conv: Conv2d,
}

impl Transition {
    fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            norm: batch_norm(in_channels, BN_EPS, vb.pp("norm"))?,
            conv: conv2d_no_bias(
                in_channels,
                out_channels,
                1,
                Conv2dConfig::default(),
                vb.pp("conv"),
            )?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.apply_t(&self.norm, false)?
            .relu()?
            .apply(&self.conv)?
            .avg_pool2d(2)
    }
}

pub struct DenseNet {
    name: String,
    conv0: Conv2d,
    norm0: BatchNorm,
    blocks: Vec<DenseBlock>,
    transitions: Vec<Transition>,
    norm5: BatchNorm,
    classifier: Linear,
}

impl DenseNet {
    /// Builds the network from `vb` (root of a torchvision-style checkpoint).
    ///
    /// A `classifier` that is absent or has the wrong shape is replaced by a
    /// freshly initialised one with `num_classes` outputs.
    pub fn load(config: &DenseNetConfig, num_classes: usize, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let features = vb.pp("features");
        let conv0 = conv2d_no_bias(
            3,
            config.num_init_features,
            7,
            Conv2dConfig {
                padding: 3,
                stride: 2,
                ..Default::default()
            },
            features.pp("conv0"),
        )?;
        let norm0 = batch_norm(config.num_init_features, BN_EPS, features.pp("norm0"))?;

        let mut channels = config.num_init_features;
        let mut blocks = Vec::with_capacity(config.block_config.len());
        let mut transitions = Vec::with_capacity(config.block_config.len().saturating_sub(1));
        for (i, &num_layers) in config.block_config.iter().enumerate() {
            blocks.push(DenseBlock::new(
                num_layers,
                channels,
                config.growth_rate,
                config.bn_size,
                features.pp(format!("denseblock{}", i + 1)),
            )?);
            channels += num_layers * config.growth_rate;

            if i + 1 != config.block_config.len() {
                transitions.push(Transition::new(
                    channels,
                    channels / 2,
                    features.pp(format!("transition{}", i + 1)),
                )?);
                channels /= 2;
            }
        }
        let norm5 = batch_norm(channels, BN_EPS, features.pp("norm5"))?;

        let classifier = match linear(channels, num_classes, vb.pp("classifier")) {
            Ok(classifier) => classifier,
            Err(e) => {
                warn!(
                    "Checkpoint has no usable {}-way classifier ({}), initialising a new head",
                    num_classes, e
                );
                fresh_classifier(channels, num_classes, vb.device())?
            }
        };

        let depth = 2 * config.block_config.iter().sum::<usize>() + config.block_config.len() + 1;
        debug!(
            "Built DenseNet-{} with {} output features",
            depth, channels
        );

        Ok(Self {
            name: format!("DenseNet-{}", depth),
            conv0,
            norm0,
            blocks,
            transitions,
            norm5,
            classifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        // pool0 follows a ReLU, so zero padding is equivalent to -inf padding.
        let mut xs = xs
            .apply(&self.conv0)?
            .apply_t(&self.norm0, false)?
            .relu()?
            .pad_with_zeros(D::Minus1, 1, 1)?
            .pad_with_zeros(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;

        for (i, block) in self.blocks.iter().enumerate() {
            xs = block.forward(&xs)?;
            if let Some(transition) = self.transitions.get(i) {
                xs = transition.forward(&xs)?;
            }
        }

        xs.apply_t(&self.norm5, false)
    }

    pub fn head(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        features.relu()?.mean((2, 3))?.apply(&self.classifier)
    }
}

fn fresh_classifier(in_features: usize, out_features: usize, device: &Device) -> Result<Linear> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let head = linear(in_features, out_features, vb)?;
    Ok(Linear::new(
        head.weight().detach(),
        head.bias().map(|bias| bias.detach()),
    ))
}
