//! Image re-encoding for EPUB embedding.
//!
//! Extracted page images are classified (photographic vs diagrammatic),
//! resized to the active quality profile, re-encoded, and paired with
//! nearby text. Individual failures skip the image rather than failing
//! the batch.

mod associate;

use std::collections::HashSet;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use rayon::prelude::*;

use crate::error::Result;
use crate::model::{
    ImageAsset, ImageClass, ImageEncoding, ProcessedImage, QualityProfile, TextRun,
};
use crate::oracle::Oracle;

/// Dimension above which an image is treated as photographic.
const PHOTO_DIMENSION: u32 = 500;

/// Sampled palette size above which an image is treated as photographic.
const PHOTO_PALETTE: usize = 100;

/// Sampled palette size at or below which an image is treated as line art.
const DIAGRAM_PALETTE: usize = 16;

/// Rough number of pixels sampled when counting palette colors.
const PALETTE_SAMPLE_TARGET: usize = 10_000;

/// Bounding box for oracle alt-text thumbnails.
const THUMBNAIL_BOUND: u32 = 512;

const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Per-profile resize and compression parameters.
struct ProfileParams {
    max_width: u32,
    jpeg_quality: u8,
    png_compression: CompressionType,
    /// Unsharp mask (sigma, threshold), None to skip sharpening.
    sharpen: Option<(f32, i32)>,
}

fn profile_params(profile: QualityProfile) -> ProfileParams {
    match profile {
        QualityProfile::Fast => ProfileParams {
            max_width: 600,
            jpeg_quality: 70,
            png_compression: CompressionType::Fast,
            sharpen: Some((1.5, 5)),
        },
        QualityProfile::Standard => ProfileParams {
            max_width: 800,
            jpeg_quality: 85,
            png_compression: CompressionType::Default,
            sharpen: Some((1.0, 3)),
        },
        QualityProfile::High => ProfileParams {
            max_width: 1200,
            jpeg_quality: 95,
            png_compression: CompressionType::Best,
            sharpen: None,
        },
    }
}

/// Image stage configuration.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Quality profile controlling size and compression.
    pub profile: QualityProfile,

    /// Ask the oracle for alt text when one is available.
    pub generate_alt_text: bool,
}

impl ImageOptions {
    pub fn new() -> Self {
        Self {
            profile: QualityProfile::Standard,
            generate_alt_text: true,
        }
    }

    pub fn with_profile(mut self, profile: QualityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_alt_text(mut self, enabled: bool) -> Self {
        self.generate_alt_text = enabled;
        self
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-encodes extracted images and attaches text context.
pub struct ImageProcessor {
    options: ImageOptions,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self::with_options(ImageOptions::new())
    }

    pub fn with_options(options: ImageOptions) -> Self {
        Self { options }
    }

    /// Process every extracted image. Failed images are logged and
    /// dropped; the result keeps the input order.
    pub fn process(
        &self,
        images: &[ImageAsset],
        runs: &[TextRun],
        oracle: Option<&dyn Oracle>,
    ) -> Vec<ProcessedImage> {
        if images.is_empty() {
            return Vec::new();
        }

        log::info!(
            "processing {} images with profile {}",
            images.len(),
            self.options.profile
        );

        let mut processed: Vec<ProcessedImage> = images
            .par_iter()
            .filter_map(|asset| match self.process_single(asset) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("skipping image {}: {e}", asset.id);
                    None
                }
            })
            .collect();

        for image in &mut processed {
            associate::associate(image, runs);
        }

        if self.options.generate_alt_text {
            if let Some(oracle) = oracle {
                for image in &mut processed {
                    self.generate_alt_text(image, oracle);
                }
            }
        }

        log::info!(
            "image processing complete: {} of {} images",
            processed.len(),
            images.len()
        );
        processed
    }

    fn process_single(&self, asset: &ImageAsset) -> Result<ProcessedImage> {
        let decoded = image::load_from_memory(&asset.data)?;
        let params = profile_params(self.options.profile);

        let original_width = decoded.width();
        let original_height = decoded.height();
        let original_size = asset.data.len();

        let class = classify(&decoded);
        let has_alpha = asset.has_alpha || decoded.color().has_alpha();
        let encoding = choose_encoding(has_alpha, class);

        let mut working = if original_width > params.max_width {
            let scale = params.max_width as f32 / original_width as f32;
            let height = ((original_height as f32 * scale) as u32).max(1);
            decoded.resize_exact(params.max_width, height, FilterType::Lanczos3)
        } else {
            decoded
        };

        if let Some((sigma, threshold)) = params.sharpen {
            working = working.unsharpen(sigma, threshold);
        }

        let data = encode(&working, encoding, &params)?;
        let compression_ratio = if original_size > 0 {
            data.len() as f64 / original_size as f64
        } else {
            1.0
        };

        log::debug!(
            "image {}: {}x{} {} -> {}x{} {} ({} -> {} bytes)",
            asset.id,
            original_width,
            original_height,
            asset.encoding,
            working.width(),
            working.height(),
            encoding.extension(),
            original_size,
            data.len()
        );

        Ok(ProcessedImage {
            id: asset.id.clone(),
            original_encoding: asset.encoding.clone(),
            encoding,
            class,
            original_width,
            original_height,
            width: working.width(),
            height: working.height(),
            original_size,
            processed_size: data.len(),
            compression_ratio,
            page: asset.page,
            bbox: asset.bbox,
            alt_text: None,
            associated_text: None,
            text_position: None,
            profile: self.options.profile,
            data,
        })
    }

    fn generate_alt_text(&self, image: &mut ProcessedImage, oracle: &dyn Oracle) {
        let thumbnail = match alt_text_thumbnail(&image.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("alt text thumbnail for {} failed: {e}", image.id);
                return;
            }
        };

        let context = image
            .associated_text
            .as_deref()
            .unwrap_or("various topics");
        let prompt = format!(
            "Describe this image for accessibility purposes. Focus on what matters \
             for understanding the content and keep the description concise.\n\n\
             Context: the image appears in a document about {context}."
        );

        match oracle.describe_image(&thumbnail, &prompt) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    image.alt_text = Some(text.to_string());
                }
            }
            Err(e) => {
                log::warn!("alt text generation for {} failed: {e}", image.id);
            }
        }
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify by size first, then by sampled palette. Mid-palette small
/// images fall through to photographic so they take the JPEG path.
fn classify(image: &DynamicImage) -> ImageClass {
    if image.width() > PHOTO_DIMENSION || image.height() > PHOTO_DIMENSION {
        return ImageClass::Photographic;
    }

    let palette = sample_palette(image, PHOTO_PALETTE);
    if palette > PHOTO_PALETTE {
        return ImageClass::Photographic;
    }
    if palette <= DIAGRAM_PALETTE {
        return ImageClass::Diagrammatic;
    }
    ImageClass::Photographic
}

fn choose_encoding(has_alpha: bool, class: ImageClass) -> ImageEncoding {
    if has_alpha {
        return ImageEncoding::Png;
    }
    match class {
        ImageClass::Photographic => ImageEncoding::Jpeg,
        ImageClass::Diagrammatic => ImageEncoding::Png,
    }
}

/// Count distinct colors over a pixel sample, stopping past `cap`.
fn sample_palette(image: &DynamicImage, cap: usize) -> usize {
    let rgba = image.to_rgba8();
    let total = (rgba.width() * rgba.height()) as usize;
    let stride = (total / PALETTE_SAMPLE_TARGET).max(1);

    let mut colors = HashSet::new();
    for pixel in rgba.pixels().step_by(stride) {
        colors.insert(pixel.0);
        if colors.len() > cap {
            break;
        }
    }
    colors.len()
}

fn encode(image: &DynamicImage, encoding: ImageEncoding, params: &ProfileParams) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match encoding {
        ImageEncoding::Jpeg => {
            let rgb = if image.color().has_alpha() {
                flatten_onto_white(image)
            } else {
                image.to_rgb8()
            };
            let encoder =
                JpegEncoder::new_with_quality(Cursor::new(&mut buffer), params.jpeg_quality);
            rgb.write_with_encoder(encoder)?;
        }
        ImageEncoding::Png => {
            let encoder = PngEncoder::new_with_quality(
                Cursor::new(&mut buffer),
                params.png_compression,
                PngFilter::Adaptive,
            );
            if image.color().has_alpha() {
                image.to_rgba8().write_with_encoder(encoder)?;
            } else {
                image.to_rgb8().write_with_encoder(encoder)?;
            }
        }
    }
    Ok(buffer)
}

/// Composite an image onto a white background, dropping alpha.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Re-encode processed bytes as a small JPEG for the oracle.
fn alt_text_thumbnail(data: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(data)?;
    let small = if decoded.width() > THUMBNAIL_BOUND || decoded.height() > THUMBNAIL_BOUND {
        decoded.resize(THUMBNAIL_BOUND, THUMBNAIL_BOUND, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = if small.color().has_alpha() {
        flatten_onto_white(&small)
    } else {
        small.to_rgb8()
    };

    let mut buffer = Vec::new();
    let encoder =
        JpegEncoder::new_with_quality(Cursor::new(&mut buffer), THUMBNAIL_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Rect;
    use image::{Rgba, RgbaImage};

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn asset(id: &str, data: Vec<u8>, width: u32, height: u32, has_alpha: bool) -> ImageAsset {
        ImageAsset {
            id: id.into(),
            page: 1,
            bbox: Rect::new(0.0, 0.0, width as f32, height as f32),
            width,
            height,
            encoding: "png".into(),
            data,
            has_alpha,
            color_space: Some("DeviceRGB".into()),
        }
    }

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_large_image_is_photographic() {
        let img = DynamicImage::ImageRgb8(gradient(600, 100));
        assert_eq!(classify(&img), ImageClass::Photographic);
    }

    #[test]
    fn test_two_color_image_is_diagrammatic() {
        let img = DynamicImage::ImageRgb8(checkerboard(120, 120));
        assert_eq!(classify(&img), ImageClass::Diagrammatic);
    }

    #[test]
    fn test_rich_palette_small_image_is_photographic() {
        let img = DynamicImage::ImageRgb8(gradient(300, 300));
        assert_eq!(classify(&img), ImageClass::Photographic);
    }

    #[test]
    fn test_mid_palette_defaults_to_photographic() {
        // Around 30 distinct colors: too many for line art, too few for
        // the palette-based photo test.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(300, 300, |x, _| {
            Rgb([((x / 10) % 30 * 8) as u8, 0, 0])
        }));
        assert_eq!(classify(&img), ImageClass::Photographic);
    }

    #[test]
    fn test_alpha_forces_png() {
        assert_eq!(
            choose_encoding(true, ImageClass::Photographic),
            ImageEncoding::Png
        );
        assert_eq!(
            choose_encoding(false, ImageClass::Photographic),
            ImageEncoding::Jpeg
        );
        assert_eq!(
            choose_encoding(false, ImageClass::Diagrammatic),
            ImageEncoding::Png
        );
    }

    #[test]
    fn test_resize_caps_width() {
        let data = png_bytes(gradient(1600, 800));
        let source = asset("p1_a", data, 1600, 800, false);

        let processor =
            ImageProcessor::with_options(ImageOptions::new().with_profile(QualityProfile::Fast));
        let processed = processor.process_single(&source).unwrap();

        assert_eq!(processed.width, 600);
        assert_eq!(processed.height, 300);
        assert_eq!(processed.original_width, 1600);
        assert_eq!(processed.encoding, ImageEncoding::Jpeg);
    }

    #[test]
    fn test_small_image_never_upscaled() {
        let data = png_bytes(gradient(200, 100));
        let source = asset("p1_b", data, 200, 100, false);

        let processor =
            ImageProcessor::with_options(ImageOptions::new().with_profile(QualityProfile::High));
        let processed = processor.process_single(&source).unwrap();

        assert_eq!(processed.width, 200);
        assert_eq!(processed.height, 100);
    }

    #[test]
    fn test_compression_ratio_matches_sizes() {
        let data = png_bytes(checkerboard(100, 100));
        let original_len = data.len();
        let source = asset("p1_c", data, 100, 100, false);

        let processed = ImageProcessor::new().process_single(&source).unwrap();
        assert_eq!(processed.original_size, original_len);
        assert_eq!(processed.processed_size, processed.data.len());
        let expected = processed.data.len() as f64 / original_len as f64;
        assert!((processed.compression_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn test_undecodable_image_skipped() {
        let bad = asset("p1_bad", vec![0, 1, 2, 3], 10, 10, false);
        let good = asset("p1_good", png_bytes(checkerboard(50, 50)), 50, 50, false);

        let processed = ImageProcessor::new().process(&[bad, good], &[], None);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].id, "p1_good");
    }

    #[test]
    fn test_flatten_onto_white() {
        let transparent = RgbaImage::from_pixel(2, 2, Rgba([200, 0, 0, 0]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(transparent));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);

        let opaque = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(opaque));
        assert_eq!(flat.get_pixel(0, 0).0, [10, 20, 30]);
    }

    struct CaptionOracle;

    impl Oracle for CaptionOracle {
        fn describe_text(&self, _prompt: &str) -> crate::Result<String> {
            Ok(String::new())
        }

        fn describe_image(&self, image: &[u8], prompt: &str) -> crate::Result<String> {
            assert!(!image.is_empty());
            assert!(prompt.contains("accessibility"));
            Ok("A bar chart of quarterly sales.".into())
        }
    }

    struct OfflineOracle;

    impl Oracle for OfflineOracle {
        fn describe_text(&self, _prompt: &str) -> crate::Result<String> {
            Err(Error::GenerationFailure("offline".into()))
        }

        fn describe_image(&self, _image: &[u8], _prompt: &str) -> crate::Result<String> {
            Err(Error::GenerationFailure("offline".into()))
        }
    }

    #[test]
    fn test_oracle_alt_text_attached() {
        let source = asset("p1_d", png_bytes(checkerboard(60, 60)), 60, 60, false);
        let processed = ImageProcessor::new().process(&[source], &[], Some(&CaptionOracle));

        assert_eq!(
            processed[0].alt_text.as_deref(),
            Some("A bar chart of quarterly sales.")
        );
    }

    #[test]
    fn test_oracle_failure_leaves_alt_text_empty() {
        let source = asset("p1_e", png_bytes(checkerboard(60, 60)), 60, 60, false);
        let processed = ImageProcessor::new().process(&[source], &[], Some(&OfflineOracle));

        assert!(processed[0].alt_text.is_none());
    }

    #[test]
    fn test_association_runs_during_process() {
        let source = asset("p1_f", png_bytes(checkerboard(60, 60)), 60, 60, false);
        let runs = vec![TextRun::new(
            "Figure 1 shows the layout",
            Rect::new(0.0, 110.0, 200.0, 122.0),
            1,
            0,
        )];

        let processed = ImageProcessor::new().process(&[source], &runs, None);
        assert_eq!(
            processed[0].associated_text.as_deref(),
            Some("Figure 1 shows the layout")
        );
    }
}
