use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use xray_classifier::{
    config::ServerConfig,
    labels::NUM_LABELS,
    model::{Classifier, DenseNet, DenseNetConfig},
    pipeline::Predictor,
    report::ReportBuilder,
    server::{handlers::AppState, router},
};

pub const BOUNDARY: &str = "xray-test-boundary";

/// A DenseNet small enough to run in debug builds.
pub fn tiny_config() -> DenseNetConfig {
    DenseNetConfig {
        growth_rate: 4,
        block_config: vec![2, 2],
        num_init_features: 8,
        bn_size: 2,
    }
}

/// Randomly initialised tiny network plus the `VarMap` holding its weights.
pub fn tiny_network() -> (DenseNet, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let network = DenseNet::load(&tiny_config(), NUM_LABELS, vb).expect("tiny densenet");
    (network, varmap)
}

pub fn tiny_classifier() -> Arc<Classifier> {
    let (network, _varmap) = tiny_network();
    Arc::new(Classifier::from_backbone(network, Device::Cpu))
}

pub fn predictor(with_report: bool) -> Arc<Predictor> {
    let report = with_report.then(|| ReportBuilder::new("Test Report"));
    Arc::new(Predictor::new(tiny_classifier(), report))
}

pub fn test_app(with_report: bool) -> Router {
    test_app_with(&ServerConfig::default(), with_report)
}

pub fn test_app_with(config: &ServerConfig, with_report: bool) -> Router {
    let state = AppState {
        predictor: predictor(with_report),
    };
    router(state, config)
}

/// A synthetic chest-film-like gradient, so the network sees structure.
pub fn rgb_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 255) / width.max(1)) as u8;
        Rgb([v, ((y * 255) / height.max(1)) as u8, 255 - v])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
    let image = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]));
    encode(DynamicImage::ImageLuma8(image), ImageFormat::Png)
}

pub fn rgb_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([120, 130, 140]));
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).expect("encode test image");
    buffer.into_inner()
}

/// Builds a multipart body with one file field.
pub fn multipart_body(field: &str, filename: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload(content_type: &str, data: &[u8]) -> Request<Body> {
    predict_request(multipart_body("file", "upload.bin", Some(content_type), data))
}
