//! Image preprocessing ahead of recognition.
//!
//! Scanned book pages are frequently low-contrast gray on gray. The
//! pipeline is: conditional contrast boost, grayscale, binarize, despeckle.

use image::{GrayImage, RgbImage};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::filter::median_filter;

/// Contrast multiplier applied when midtones dominate.
const CONTRAST_FACTOR: f32 = 1.5;

/// Luma band counted as midtone.
const MIDTONE_LOW: u8 = 100;
const MIDTONE_HIGH: u8 = 155;

/// Histogram mass inside the midtone band that triggers the boost.
const MIDTONE_TRIGGER: f64 = 0.7;

/// Binarization cut point.
const BINARIZE_THRESHOLD: u8 = 128;

/// Prepare a rendered page for recognition.
pub fn preprocess(image: &RgbImage) -> GrayImage {
    let boosted;
    let working = if midtone_fraction(image) > MIDTONE_TRIGGER {
        log::debug!("low-contrast page, boosting contrast x{CONTRAST_FACTOR}");
        boosted = enhance_contrast(image, CONTRAST_FACTOR);
        &boosted
    } else {
        image
    };

    let gray = image::imageops::grayscale(working);
    let binary = threshold(&gray, BINARIZE_THRESHOLD, ThresholdType::Binary);
    median_filter(&binary, 1, 1)
}

/// Fraction of pixels whose luma falls in the midtone band.
fn midtone_fraction(image: &RgbImage) -> f64 {
    let gray = image::imageops::grayscale(image);
    let total = (gray.width() as u64) * (gray.height() as u64);
    if total == 0 {
        return 0.0;
    }
    let midtones = gray
        .pixels()
        .filter(|p| (MIDTONE_LOW..=MIDTONE_HIGH).contains(&p.0[0]))
        .count();
    midtones as f64 / total as f64
}

/// Linear contrast stretch around the midpoint.
fn enhance_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let stretched = (*channel as f32 - 128.0) * factor + 128.0;
            *channel = stretched.clamp(0.0, 255.0) as u8;
        }
    }
    out
}
