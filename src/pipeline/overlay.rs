use super::gradcam::ActivationMap;
use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const IMAGE_WEIGHT: f32 = 0.5;

/// Jet colour map for `v` in [0, 1], returned as RGB in [0, 1].
pub fn jet(v: f32) -> [f32; 3] {
    let v = v.clamp(0.0, 1.0);
    let channel = |centre: f32| (1.5 - (4.0 * v - centre).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Blends the colour-mapped activation map over the display image.
///
/// The blend is rescaled so its brightest channel value becomes 255.
pub fn compose(rgb: &RgbImage, map: &ActivationMap) -> Result<RgbImage> {
    if rgb.dimensions() != (map.width, map.height) {
        return Err(Error::internal(format!(
            "Activation map is {}x{} but the image is {}x{}",
            map.width,
            map.height,
            rgb.width(),
            rgb.height()
        )));
    }

    let blended: Vec<[f32; 3]> = rgb
        .pixels()
        .zip(&map.values)
        .map(|(pixel, &weight)| {
            // Quantised the same way as an 8-bit colour map lookup.
            let level = f32::from((weight * 255.0) as u8) / 255.0;
            let heat = jet(level);
            [0, 1, 2].map(|c| {
                (1.0 - IMAGE_WEIGHT) * heat[c] + IMAGE_WEIGHT * f32::from(pixel[c]) / 255.0
            })
        })
        .collect();

    let peak = blended
        .iter()
        .flat_map(|p| p.iter().copied())
        .fold(0.0, f32::max)
        .max(f32::EPSILON);

    let mut out = RgbImage::new(map.width, map.height);
    for (dst, src) in out.pixels_mut().zip(&blended) {
        *dst = Rgb(src.map(|v| (255.0 * v / peak) as u8));
    }
    Ok(out)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Composites the overlay and returns it as base64 PNG text.
pub fn render_base64(rgb: &RgbImage, map: &ActivationMap) -> Result<String> {
    let overlay = compose(rgb, map)?;
    Ok(STANDARD.encode(encode_png(&overlay)?))
}
