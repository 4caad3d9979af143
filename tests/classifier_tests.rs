use candle_core::{DType, Device, Tensor};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use xray_classifier::{
    Error,
    config::{DeviceKind, ModelConfig},
    labels::NUM_LABELS,
    model::{Classifier, select_device},
    pipeline::{decode, prepare},
};

mod common;

use common::fixtures::{rgb_png, tiny_config, tiny_network};

fn sample_input() -> Tensor {
    let image = decode(&rgb_png(96, 96)).unwrap();
    prepare(&image, &Device::Cpu).unwrap().tensor
}

#[test]
fn weights_file_reproduces_in_memory_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.safetensors");

    let (network, varmap) = tiny_network();
    varmap.save(&path).unwrap();
    let in_memory = Classifier::from_backbone(network, Device::Cpu);
    let from_file = Classifier::from_weights_file(&path, &tiny_config(), Device::Cpu).unwrap();

    let input = sample_input();
    let expected = in_memory.infer(&input).unwrap();
    let actual = from_file.infer(&input).unwrap();

    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }
}

#[test]
fn foreign_classifier_head_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("imagenet.safetensors");

    let (_, varmap) = tiny_network();
    let num_features = tiny_config().num_features();
    let mut tensors: HashMap<String, Tensor> = varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    tensors.insert(
        "classifier.weight".to_string(),
        Tensor::zeros((1000, num_features), DType::F32, &Device::Cpu).unwrap(),
    );
    tensors.insert(
        "classifier.bias".to_string(),
        Tensor::zeros(1000, DType::F32, &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, &path).unwrap();

    let classifier = Classifier::from_weights_file(&path, &tiny_config(), Device::Cpu).unwrap();
    let scores = classifier.infer(&sample_input()).unwrap();

    assert_eq!(scores.len(), NUM_LABELS);
}

#[test]
fn missing_backbone_weights_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.safetensors");
    let tensors: HashMap<String, Tensor> = HashMap::from([(
        "unrelated".to_string(),
        Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap(),
    )]);
    candle_core::safetensors::save(&tensors, &path).unwrap();

    let result = Classifier::from_weights_file(&path, &tiny_config(), Device::Cpu);

    assert!(matches!(result, Err(Error::Tensor(_))));
}

#[tokio::test]
async fn load_rejects_weights_of_another_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.safetensors");
    let (_, varmap) = tiny_network();
    varmap.save(&path).unwrap();

    // The configured architecture is DenseNet-121, which the tiny file cannot satisfy.
    let config = ModelConfig {
        weights_path: path.to_string_lossy().to_string(),
        device: DeviceKind::Cpu,
        ..ModelConfig::default()
    };

    assert!(Classifier::load(&config).await.is_err());
}

#[test]
fn auto_device_resolves() {
    let device = select_device(DeviceKind::Auto).unwrap();
    assert!(device.is_cpu() || device.is_cuda());
}
