use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, GrayImage};
use std::io::Cursor;

use crate::ocr::{ImageVariant, OcrImage, VariantKind};

const MAX_SCALED_WIDTH: u32 = 6000;

/// Decodes `image_bytes` and returns the four variants in recognition order:
/// original, grayscale-upscaled, then one binarization per threshold.
pub(super) fn build_variants(
    image_bytes: &[u8],
    upscale: u32,
    thresholds: [u8; 2],
) -> Result<Vec<ImageVariant>> {
    let image =
        image::load_from_memory(image_bytes).with_context(|| "failed to decode image for OCR")?;
    let (width, _) = image.dimensions();
    let scale = ocr_scale(width, upscale);

    let stretched = contrast_stretch(&upscaled_luma(&image, scale));
    let mut variants = vec![
        variant(VariantKind::Original, image)?,
        variant(
            VariantKind::GrayscaleUpscaled,
            DynamicImage::ImageLuma8(stretched.clone()),
        )?,
    ];
    for threshold in thresholds {
        variants.push(variant(
            VariantKind::Binarized(threshold),
            DynamicImage::ImageLuma8(binarize(&stretched, threshold)),
        )?);
    }
    Ok(variants)
}

fn variant(kind: VariantKind, image: DynamicImage) -> Result<ImageVariant> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| format!("failed to encode {} variant", kind))?;
    Ok(ImageVariant {
        kind,
        image: OcrImage {
            bytes,
            width,
            height,
        },
    })
}

fn upscaled_luma(image: &DynamicImage, scale: u32) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    // Transparent pixels are composited onto white.
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    }
}

pub(super) fn ocr_scale(width: u32, requested: u32) -> u32 {
    let mut scale = requested.max(1);
    while width.saturating_mul(scale) > MAX_SCALED_WIDTH && scale > 1 {
        scale -= 1;
    }
    scale
}

fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = ((pixel[0].saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
    output
}
