use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use std::io::Cursor;
use thiserror::Error;

use crate::types::NormalizedImage;

/// Multiplier applied to both the contrast and the sharpness enhancement.
pub const ENHANCE_FACTOR: f32 = 1.5;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Decode container bytes (JPEG / PNG / …) into a bitmap.
pub fn decode(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

/// Force RGB8, then boost contrast and sharpness by [`ENHANCE_FACTOR`].
///
/// Alpha and palette information are dropped, not composited.
pub fn normalize(img: DynamicImage) -> NormalizedImage {
    let source_color = img.color();
    let rgb = img.into_rgb8();
    let rgb = enhance_contrast(&rgb, ENHANCE_FACTOR);
    let rgb = enhance_sharpness(&rgb, ENHANCE_FACTOR);
    NormalizedImage::new(rgb, source_color)
}

/// PNG bytes of a normalized image, for engines that take encoded input.
pub fn encode_png(img: &NormalizedImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.pixels()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

// ── Enhancement ───────────────────────────────────────────────────────────────

/// Scale every channel away from the image's mean luminance.
fn enhance_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luma(img);
    let degenerate: RgbImage = ImageBuffer::from_pixel(img.width(), img.height(), Rgb([mean; 3]));
    blend(&degenerate, img, factor)
}

/// Push each pixel away from a 3×3 smoothed copy of itself.
fn enhance_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    blend(&smooth(img), img, factor)
}

/// `degenerate + factor * (img - degenerate)` per channel, clipped to 0..=255.
fn blend(degenerate: &RgbImage, img: &RgbImage, factor: f32) -> RgbImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let d = degenerate.get_pixel(x, y);
        let s = img.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            let d = d[c] as f32;
            clip8(d + factor * (s[c] as f32 - d))
        }))
    })
}

fn clip8(v: f32) -> u8 {
    if v <= 0.0 {
        0
    } else if v >= 255.0 {
        255
    } else {
        v as u8
    }
}

/// ITU-R 601 luma, fixed-point.
fn luma(p: &Rgb<u8>) -> u32 {
    (p[0] as u32 * 19595 + p[1] as u32 * 38470 + p[2] as u32 * 7471 + 0x8000) >> 16
}

fn mean_luma(img: &RgbImage) -> u8 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0;
    }
    let sum: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    (sum as f64 / count as f64 + 0.5).min(255.0) as u8
}

/// 3×3 smoothing kernel (centre weight 5, neighbours 1, scale 13).
/// Border pixels are copied unchanged.
fn smooth(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return *img.get_pixel(x, y);
        }
        let mut acc = [0u32; 3];
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                let weight = if nx == x && ny == y { 5 } else { 1 };
                let p = img.get_pixel(nx, ny);
                for (a, v) in acc.iter_mut().zip(p.0) {
                    *a += v as u32 * weight;
                }
            }
        }
        Rgb(acc.map(|a| ((a + 6) / 13) as u8))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GrayImage, Luma, Rgba, RgbaImage};

    fn solid_rgb(width: u32, height: u32, value: u8) -> RgbImage {
        ImageBuffer::from_pixel(width, height, Rgb([value; 3]))
    }

    fn two_tone(width: u32, height: u32, left: u8, right: u8) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, _| {
            Rgb([if x < width / 2 { left } else { right }; 3])
        })
    }

    #[test]
    fn rgba_input_becomes_rgb() {
        let img: RgbaImage = ImageBuffer::from_pixel(6, 4, Rgba([10, 20, 30, 0]));
        let out = normalize(DynamicImage::ImageRgba8(img));
        assert_eq!((out.width(), out.height()), (6, 4));
        assert_eq!(out.source_color(), ColorType::Rgba8);
        // Fully transparent pixels keep their colour; alpha is discarded.
        let opaque: RgbImage = ImageBuffer::from_pixel(6, 4, Rgb([10, 20, 30]));
        let expected = normalize(DynamicImage::ImageRgb8(opaque));
        assert_eq!(out.pixels(), expected.pixels());
    }

    #[test]
    fn grayscale_input_becomes_rgb() {
        let img: GrayImage = ImageBuffer::from_pixel(5, 5, Luma([77]));
        let out = normalize(DynamicImage::ImageLuma8(img));
        assert_eq!(out.source_color(), ColorType::L8);
        assert_eq!(*out.pixels().get_pixel(2, 2), Rgb([77, 77, 77]));
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let img = solid_rgb(8, 8, 100);
        let out = normalize(DynamicImage::ImageRgb8(img.clone()));
        assert_eq!(out.pixels(), &img);
    }

    #[test]
    fn contrast_scales_around_mean() {
        // Mean luma is 125: 100 → 87.5, 150 → 162.5 (truncated).
        let out = enhance_contrast(&two_tone(4, 1, 100, 150), 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 87);
        assert_eq!(out.get_pixel(3, 0)[0], 162);
    }

    #[test]
    fn contrast_clips_to_valid_range() {
        let out = enhance_contrast(&two_tone(4, 1, 0, 255), 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn sharpness_emphasises_isolated_pixel() {
        let mut img = solid_rgb(3, 3, 50);
        img.put_pixel(1, 1, Rgb([200; 3]));
        let out = enhance_sharpness(&img, 1.5);
        // smooth centre = (8*50 + 5*200 + 6) / 13 = 108; 108 + 1.5*(200-108) = 246
        assert_eq!(out.get_pixel(1, 1)[0], 246);
        // Border pixels equal their smoothed copy, so they stay put.
        assert_eq!(out.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn normalize_is_deterministic() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
        }));
        let a = normalize(img.clone());
        let b = normalize(img);
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn empty_image_does_not_panic() {
        let out = normalize(DynamicImage::ImageRgb8(RgbImage::new(0, 0)));
        assert_eq!(out.width(), 0);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::Load(_)));
    }

    #[test]
    fn encode_png_produces_png_header() {
        let out = normalize(DynamicImage::ImageRgb8(solid_rgb(4, 4, 100)));
        let png = encode_png(&out).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let back = decode(&png).unwrap();
        assert_eq!((back.width(), back.height()), (4, 4));
    }
}
