//! Integration tests for the image re-encoding stage.

use std::io::Cursor;

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

use bookforge::model::{ImageAsset, ImageClass, ImageEncoding, Rect};
use bookforge::{ImageOptions, ImageProcessor, QualityProfile};

fn png_bytes(image: DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn checkerboard(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    }))
}

fn asset(id: &str, page: u32, data: Vec<u8>, width: u32, height: u32) -> ImageAsset {
    ImageAsset {
        id: id.into(),
        page,
        bbox: Rect::new(0.0, 0.0, width as f32, height as f32),
        width,
        height,
        encoding: "png".into(),
        data,
        has_alpha: false,
        color_space: Some("DeviceRGB".into()),
    }
}

#[test]
fn test_photograph_reencoded_as_jpeg_within_profile_width() {
    let source = asset("p1_photo", 1, png_bytes(gradient(1000, 700)), 1000, 700);
    let original_size = source.data.len();

    let processor =
        ImageProcessor::with_options(ImageOptions::new().with_profile(QualityProfile::Standard));
    let processed = processor.process(&[source], &[], None);

    assert_eq!(processed.len(), 1);
    let image = &processed[0];
    assert_eq!(image.class, ImageClass::Photographic);
    assert_eq!(image.encoding, ImageEncoding::Jpeg);
    assert!(image.data.starts_with(&[0xff, 0xd8]), "missing JPEG magic");
    assert_eq!(image.width, 800);
    assert_eq!(image.height, 560);
    assert_eq!(image.original_width, 1000);
    assert_eq!(image.original_height, 700);
    assert_eq!(image.original_size, original_size);
    assert_eq!(image.processed_size, image.data.len());
    let expected = image.data.len() as f64 / original_size as f64;
    assert!((image.compression_ratio - expected).abs() < 1e-9);
}

#[test]
fn test_line_art_stays_png_at_native_size() {
    let source = asset("p2_chart", 2, png_bytes(checkerboard(64, 64)), 64, 64);

    let processed = ImageProcessor::new().process(&[source], &[], None);

    assert_eq!(processed.len(), 1);
    let image = &processed[0];
    assert_eq!(image.class, ImageClass::Diagrammatic);
    assert_eq!(image.encoding, ImageEncoding::Png);
    assert!(
        image.data.starts_with(&[0x89, b'P', b'N', b'G']),
        "missing PNG magic"
    );
    assert_eq!(image.width, 64);
    assert_eq!(image.height, 64);
}

#[test]
fn test_alpha_channel_keeps_png_for_photographs() {
    let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(600, 400, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 100, 200])
    }));
    let mut source = asset("p3_overlay", 3, png_bytes(rgba), 600, 400);
    source.has_alpha = true;

    let processed = ImageProcessor::new().process(&[source], &[], None);

    assert_eq!(processed.len(), 1);
    let image = &processed[0];
    assert_eq!(image.class, ImageClass::Photographic);
    assert_eq!(image.encoding, ImageEncoding::Png);
    assert!(image.data.starts_with(&[0x89, b'P', b'N', b'G']));
    // Within the profile cap, so dimensions stay as decoded.
    assert_eq!(image.width, 600);
    assert_eq!(image.height, 400);
}

#[test]
fn test_batch_preserves_order_and_skips_failures() {
    let sources = vec![
        asset("p1_photo", 1, png_bytes(gradient(900, 600)), 900, 600),
        asset("p1_broken", 1, vec![0x00, 0x01, 0x02, 0x03], 10, 10),
        asset("p2_chart", 2, png_bytes(checkerboard(80, 80)), 80, 80),
    ];

    let processed = ImageProcessor::new().process(&sources, &[], None);

    assert_eq!(processed.len(), 2);
    assert_eq!(processed[0].id, "p1_photo");
    assert_eq!(processed[0].encoding, ImageEncoding::Jpeg);
    assert_eq!(processed[1].id, "p2_chart");
    assert_eq!(processed[1].encoding, ImageEncoding::Png);
}
