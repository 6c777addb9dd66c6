//! Pixel difference visualization for two candidate duplicates.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::duplicates::{CandidateGroup, ImageRecord, ReviewError};

/// Stand-in for the maximum difference of pixel-identical images.
pub const DIFF_EPSILON: f64 = 1e-6;

/// Result of comparing two images.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Factor the intensity map was scaled by.
    /// Higher means the images are less different.
    pub contrast_multiplier: f64,
    /// Largest per-pixel intensity difference before scaling.
    pub max_difference: u8,
    /// Contrast-normalized difference intensity map in the first image's frame.
    pub diff: GrayImage,
    /// Set when the second image had to be resampled to the first image's size.
    pub resize: Option<ResizeInfo>,
}

/// Original shapes of two images with different dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeInfo {
    pub aspect_a: f64,
    pub aspect_b: f64,
    /// Dimensions of the second image before resampling.
    pub original_b: (u32, u32),
}

impl Comparison {
    #[must_use]
    pub const fn resized(&self) -> bool {
        self.resize.is_some()
    }

    /// Package the difference map as a synthetic image record.
    ///
    /// # Errors
    /// Returns an error if PNG encoding fails.
    pub fn to_record(&self) -> Result<ImageRecord, ReviewError> {
        ImageRecord::synthetic(self.diff.clone())
    }
}

/// Compare two images pixel by pixel.
///
/// If the dimensions differ, `b` is resampled to `a`'s size with nearest-neighbour sampling,
/// so no colour values that are missing from `b` get introduced.
/// The absolute colour difference is reduced to luma,
/// then scaled so the largest difference becomes full white.
///
/// # Errors
/// Returns `InvalidImage` if either image has a zero width or height.
pub fn compare(a: &ImageRecord, b: &ImageRecord) -> Result<Comparison, ReviewError> {
    for image in [a, b] {
        if image.width() == 0 || image.height() == 0 {
            return Err(ReviewError::InvalidImage {
                width: image.width(),
                height: image.height(),
            });
        }
    }

    let (width, height) = (a.width(), a.height());
    let (other, resize) = if (b.width(), b.height()) == (width, height) {
        (Cow::Borrowed(b.pixels()), None)
    } else {
        let resampled = imageops::resize(b.pixels(), width, height, FilterType::Nearest);
        let info = ResizeInfo {
            aspect_a: a.aspect_ratio(),
            aspect_b: b.aspect_ratio(),
            original_b: (b.width(), b.height()),
        };
        (Cow::Owned(resampled), Some(info))
    };

    let intensity = difference_intensity(a.pixels(), &other);
    let max_difference = intensity.pixels().map(|pixel| pixel[0]).max().unwrap_or(0);
    let contrast_multiplier = 255.0 / if max_difference == 0 {
        DIFF_EPSILON
    } else {
        f64::from(max_difference)
    };

    let diff = GrayImage::from_fn(width, height, |x, y| {
        let value = f64::from(intensity.get_pixel(x, y)[0]) * contrast_multiplier;
        Luma([value.round().min(255.0) as u8])
    });

    Ok(Comparison {
        contrast_multiplier,
        max_difference,
        diff,
        resize,
    })
}

/// Compare the two largest real images of a group.
///
/// Expects the group to already be sorted by size.
/// Returns `None` for groups with fewer than two real images.
///
/// # Errors
/// Returns `InvalidImage` if either image has a zero width or height.
pub fn compare_group(group: &CandidateGroup) -> Result<Option<Comparison>, ReviewError> {
    let mut real = group.images().iter().filter(|image| !image.is_synthetic());
    match (real.next(), real.next()) {
        (Some(first), Some(second)) => compare(first, second).map(Some),
        _ => Ok(None),
    }
}

/// Per-pixel absolute colour difference reduced to BT.601 luma.
fn difference_intensity(a: &RgbImage, b: &RgbImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let Rgb([r1, g1, b1]) = *a.get_pixel(x, y);
        let Rgb([r2, g2, b2]) = *b.get_pixel(x, y);
        let red = u32::from(r1.abs_diff(r2));
        let green = u32::from(g1.abs_diff(g2));
        let blue = u32::from(b1.abs_diff(b2));
        Luma([((299 * red + 587 * green + 114 * blue + 500) / 1000) as u8])
    })
}
