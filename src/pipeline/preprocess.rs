use crate::{Error, Result};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::debug;

/// Side length of the square classifier input.
pub const INPUT_SIZE: u32 = 224;

/// ImageNet normalisation the backbone weights were trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

// Bicubic, the default resampling for RGB resizes in the training pipeline.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// One upload after resizing, in both forms the pipeline needs.
///
/// `tensor` and `rgb` come from the same resized image, so activation maps
/// computed on the tensor line up pixel for pixel with `rgb`.
pub struct PreparedImage {
    /// `(1, 3, INPUT_SIZE, INPUT_SIZE)`, channel-first, normalised.
    pub tensor: Tensor,
    pub rgb: RgbImage,
}

impl PreparedImage {
    /// Display pixel at `(x, y)` scaled to [0, 1].
    pub fn unit_pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let pixel = self.rgb.get_pixel(x, y);
        [
            f32::from(pixel[0]) / 255.0,
            f32::from(pixel[1]) / 255.0,
            f32::from(pixel[2]) / 255.0,
        ]
    }
}

/// Decodes an upload, detecting the format from its content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::invalid_input("Uploaded image is empty"));
    }
    Ok(image::load_from_memory(bytes)?)
}

pub fn prepare(image: &DynamicImage, device: &Device) -> Result<PreparedImage> {
    debug!(
        "Preparing {}x{} {:?} image",
        image.width(),
        image.height(),
        image.color()
    );

    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER);
    let tensor = to_tensor(&resized, device)?;

    Ok(PreparedImage {
        tensor,
        rgb: resized,
    })
}

fn to_tensor(image: &RgbImage, device: &Device) -> Result<Tensor> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * plane + i] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok(Tensor::from_vec(
        data,
        (1, 3, height as usize, width as usize),
        device,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(decode(&[]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn garbage_is_an_image_error() {
        assert!(matches!(
            decode(b"definitely not a png"),
            Err(Error::Image(_))
        ));
    }

    #[test]
    fn normalises_each_channel() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 128])));
        let prepared = prepare(&image, &Device::Cpu).unwrap();

        let values = prepared
            .tensor
            .squeeze(0)
            .unwrap()
            .to_vec3::<f32>()
            .unwrap();
        let expected = [
            (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0],
            (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1],
            (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2],
        ];
        for c in 0..3 {
            assert!((values[c][100][100] - expected[c]).abs() < 1e-5);
        }
        assert_eq!(prepared.unit_pixel(5, 5), [1.0, 0.0, 128.0 / 255.0]);
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 60, Luma([90])));
        let prepared = prepare(&image, &Device::Cpu).unwrap();

        assert_eq!(prepared.tensor.dims(), &[1, 3, 224, 224]);
        let [r, g, b] = prepared.unit_pixel(0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }
}
