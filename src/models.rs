use std::sync::Arc;

use image::{DynamicImage, GrayImage};

use crate::error::{PipelineError, Result};

/// Orientation of a captured frame, named after the correction it needs.
///
/// Values follow the EXIF orientation tag (1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    pub fn from_exif(tag: u16) -> Result<Self> {
        match tag {
            1 => Ok(Self::Up),
            2 => Ok(Self::UpMirrored),
            3 => Ok(Self::Down),
            4 => Ok(Self::DownMirrored),
            5 => Ok(Self::LeftMirrored),
            6 => Ok(Self::Right),
            7 => Ok(Self::RightMirrored),
            8 => Ok(Self::Left),
            other => Err(PipelineError::UnsupportedOrientation(other)),
        }
    }

    pub fn exif_tag(self) -> u16 {
        match self {
            Self::Up => 1,
            Self::UpMirrored => 2,
            Self::Down => 3,
            Self::DownMirrored => 4,
            Self::LeftMirrored => 5,
            Self::Right => 6,
            Self::RightMirrored => 7,
            Self::Left => 8,
        }
    }

    /// Rotate/mirror pixel data into the upright frame
    pub fn correct(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Up => image,
            Self::UpMirrored => image.fliph(),
            Self::Down => image.rotate180(),
            Self::DownMirrored => image.flipv(),
            Self::LeftMirrored => image.rotate90().fliph(),
            Self::Right => image.rotate90(),
            Self::RightMirrored => image.rotate270().fliph(),
            Self::Left => image.rotate270(),
        }
    }
}

/// Raw frame delivered by a capture source.
///
/// The orientation is kept as the raw tag so that an unknown value is only
/// rejected when the frame is converted.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub image: DynamicImage,
    pub orientation_tag: u16,
}

impl CapturedImage {
    pub fn new(image: DynamicImage, orientation: Orientation) -> Self {
        Self {
            image,
            orientation_tag: orientation.exif_tag(),
        }
    }

    pub fn with_tag(image: DynamicImage, orientation_tag: u16) -> Self {
        Self {
            image,
            orientation_tag,
        }
    }

    pub fn upright(image: DynamicImage) -> Self {
        Self::new(image, Orientation::Up)
    }
}

/// Upright single-channel image, bright ink on a dark background.
///
/// Pixels are shared immutably so the display sink and the recognizer can
/// both hold the same buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImage {
    pixels: Arc<GrayImage>,
}

impl CanonicalImage {
    pub fn new(pixels: GrayImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Pixel intensities scaled to [0, 1], row-major
    pub fn activations(&self) -> Vec<f32> {
        self.pixels.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(self.pixels.as_ref().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub digit: u8,
    /// Digit rendered as text, always a single character
    pub label: String,
    /// Activation of the winning output unit
    pub confidence: f32,
    pub scores: Vec<f32>,
}

impl ClassificationResult {
    pub fn from_scores(scores: Vec<f32>) -> Option<Self> {
        let (digit, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((idx, score)),
            })?;
        let digit = u8::try_from(digit).ok().filter(|d| *d < 10)?;

        Some(Self {
            digit,
            label: digit.to_string(),
            confidence,
            scores,
        })
    }
}
