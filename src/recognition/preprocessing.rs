use image::{GrayImage, imageops, imageops::FilterType};
use imageproc::contrast::otsu_level;

use crate::error::{PipelineError, Result};
use crate::models::{CanonicalImage, CapturedImage, Orientation};

/// Size of the canonical image handed to the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalFormat {
    pub width: u32,
    pub height: u32,
}

impl CanonicalFormat {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Box the digit is scaled into, MNIST uses 20px inside 28px
    fn ink_box(&self) -> (u32, u32) {
        ((self.width * 5 / 7).max(1), (self.height * 5 / 7).max(1))
    }
}

impl Default for CanonicalFormat {
    fn default() -> Self {
        Self::new(28, 28)
    }
}

/// Turns a raw capture into the canonical recognizer input.
///
/// Pure and deterministic, performs no I/O and can run on any context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalImageConverter {
    format: CanonicalFormat,
}

impl CanonicalImageConverter {
    pub fn new(format: CanonicalFormat) -> Self {
        Self { format }
    }

    pub fn convert(&self, raw: CapturedImage) -> Result<CanonicalImage> {
        if raw.image.width() == 0 || raw.image.height() == 0 {
            return Err(PipelineError::EmptyCapture);
        }
        let orientation = Orientation::from_exif(raw.orientation_tag)?;

        // Orientation is fixed on the full-colour frame, channels are reduced afterwards
        let upright = orientation.correct(raw.image);
        let mut gray = to_grayscale(&upright);
        normalize_polarity(&mut gray);

        if gray.dimensions() != (self.format.width, self.format.height) {
            gray = frame_digit(&gray, self.format);
        }

        Ok(CanonicalImage::new(gray))
    }
}

pub fn to_grayscale(img: &image::DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Invert the image when its border is lighter than mid-grey, so that ink
/// ends up bright on a dark background
pub fn normalize_polarity(img: &mut GrayImage) {
    if border_is_light(img) {
        imageops::invert(img);
    }
}

fn border_is_light(img: &GrayImage) -> bool {
    let (width, height) = img.dimensions();
    let mut sum: u64 = 0;
    let mut count: u64 = 0;

    for (x, y, pixel) in img.enumerate_pixels() {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            sum += pixel[0] as u64;
            count += 1;
        }
    }

    // sum / count > 127.5
    count > 0 && sum * 2 > 255 * count
}

/// Bounding box (x, y, width, height) of pixels brighter than `level`
fn ink_bounds(img: &GrayImage, level: u8) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = img.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut has_ink = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel[0] > level {
            has_ink = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    has_ink.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

fn center_of_mass(img: &GrayImage) -> Option<(f32, f32)> {
    let mut mass = 0f64;
    let mut mx = 0f64;
    let mut my = 0f64;

    for (x, y, pixel) in img.enumerate_pixels() {
        let v = pixel[0] as f64;
        mass += v;
        mx += v * x as f64;
        my += v * y as f64;
    }

    (mass > 0.0).then(|| ((mx / mass) as f32, (my / mass) as f32))
}

/// Crop to the ink, fit it into the inner box and center it by mass on a
/// black canvas of the canonical size
pub fn frame_digit(gray: &GrayImage, format: CanonicalFormat) -> GrayImage {
    let level = otsu_level(gray);
    let Some((x, y, w, h)) = ink_bounds(gray, level) else {
        return imageops::resize(gray, format.width, format.height, FilterType::CatmullRom);
    };

    let cropped = imageops::crop_imm(gray, x, y, w, h).to_image();

    let (box_w, box_h) = format.ink_box();
    let scale = (box_w as f32 / w as f32).min(box_h as f32 / h as f32);
    let scaled_w = ((w as f32 * scale).round() as u32).clamp(1, box_w);
    let scaled_h = ((h as f32 * scale).round() as u32).clamp(1, box_h);
    let scaled = imageops::resize(&cropped, scaled_w, scaled_h, FilterType::CatmullRom);

    let (cx, cy) =
        center_of_mass(&scaled).unwrap_or((scaled_w as f32 / 2.0, scaled_h as f32 / 2.0));
    let offset_x = (format.width as f32 / 2.0 - cx)
        .round()
        .clamp(0.0, format.width.saturating_sub(scaled_w) as f32) as i64;
    let offset_y = (format.height as f32 / 2.0 - cy)
        .round()
        .clamp(0.0, format.height.saturating_sub(scaled_h) as f32) as i64;

    let mut canvas = GrayImage::new(format.width, format.height);
    imageops::overlay(&mut canvas, &scaled, offset_x, offset_y);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgb, RgbImage};

    fn paper_with_stroke(width: u32, height: u32) -> DynamicImage {
        // Dark vertical stroke on white paper
        let img = RgbImage::from_fn(width, height, |x, y| {
            if x >= width / 3 && x < width / 3 + 4 && y >= height / 4 && y < height * 3 / 4 {
                Rgb([20, 20, 20])
            } else {
                Rgb([240, 240, 240])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_convert_produces_canonical_size() {
        let converter = CanonicalImageConverter::default();
        let canonical = converter
            .convert(CapturedImage::upright(paper_with_stroke(90, 120)))
            .unwrap();

        assert_eq!(canonical.dimensions(), (28, 28));
    }

    #[test]
    fn test_ink_is_bright_after_conversion() {
        let converter = CanonicalImageConverter::default();
        let canonical = converter
            .convert(CapturedImage::upright(paper_with_stroke(90, 120)))
            .unwrap();

        let pixels = canonical.pixels();
        assert_eq!(pixels.get_pixel(0, 0)[0], 0);
        assert!(pixels.pixels().any(|p| p[0] > 200));
        assert!(!border_is_light(pixels));
    }

    #[test]
    fn test_digit_fits_inner_box() {
        let mut gray = to_grayscale(&paper_with_stroke(60, 60));
        normalize_polarity(&mut gray);
        let framed = frame_digit(&gray, CanonicalFormat::default());

        let (x, y, w, h) = ink_bounds(&framed, 0).unwrap();
        assert!(w <= 20 && h <= 20);
        assert!(x + w <= 28 && y + h <= 28);
    }

    #[test]
    fn test_blank_frame_is_resized() {
        let blank = GrayImage::from_pixel(50, 40, Luma([0u8]));
        let framed = frame_digit(&blank, CanonicalFormat::default());

        assert_eq!(framed.dimensions(), (28, 28));
        assert!(framed.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_zero_sized_format_does_not_underflow() {
        let mut gray = to_grayscale(&paper_with_stroke(40, 40));
        normalize_polarity(&mut gray);

        let framed = frame_digit(&gray, CanonicalFormat::new(0, 0));

        assert_eq!(framed.dimensions(), (0, 0));
    }

    #[test]
    fn test_empty_capture_is_rejected() {
        let converter = CanonicalImageConverter::default();
        let empty = CapturedImage::upright(DynamicImage::ImageLuma8(GrayImage::new(0, 0)));

        assert!(matches!(converter.convert(empty), Err(PipelineError::EmptyCapture)));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let converter = CanonicalImageConverter::default();
        let raw = CapturedImage::with_tag(paper_with_stroke(28, 28), 42);

        assert!(matches!(
            converter.convert(raw),
            Err(PipelineError::UnsupportedOrientation(42))
        ));
    }
}
