//! # bookforge
//!
//! PDF to EPUB conversion with structure recovery.
//!
//! The custom pipeline parses the source, recovers chapters and reading
//! order, re-encodes embedded images, and packages an EPUB 3 container.
//! Scanned sources fall back to OCR, and documents the custom path cannot
//! handle well are routed to an external converter.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bookforge::convert_file;
//!
//! let result = convert_file("book.pdf", "book.epub");
//! if result.success {
//!     println!("converted via {} (quality {:.0})", result.method, result.quality_score);
//! } else {
//!     eprintln!("conversion failed: {:?}", result.error);
//! }
//! ```
//!
//! ## Features
//!
//! - **Chapter recovery**: outline, font-size, pattern, and oracle-backed
//!   detection reconciled into one structure
//! - **Layout analysis**: columns, reading order, and table regions
//! - **OCR**: tesseract-backed recognition for scanned sources
//! - **Image pipeline**: classification, resizing, and re-encoding per
//!   quality profile, parallelized with Rayon
//! - **EPUB 3 output**: CJK-aware styling, navigation, deterministic
//!   manifest ordering
//! - **External fallback**: Calibre integration with quality telemetry

pub mod chapter;
pub mod epub;
pub mod error;
pub mod exec;
pub mod fallback;
pub mod image;
pub mod layout;
pub mod model;
pub mod ocr;
pub mod oracle;
pub mod parser;
pub mod pipeline;

// Re-export commonly used types
pub use chapter::ChapterDetector;
pub use epub::{DocumentGenerator, EpubOptions};
pub use error::{Error, Result};
pub use fallback::{CalibreConverter, ComplexityHints, FallbackOptions};
pub use layout::LayoutAnalyzer;
pub use model::{
    ChapterBoundary, ChapterStructure, ConversionMethod, ConversionResult, DetectionMethod,
    DocumentMetadata, ParsedDocument, PdfValidation, ProcessedImage, QualityProfile,
};
pub use ocr::{OcrEngine, OcrOptions};
pub use oracle::{NoopOracle, Oracle};
pub use parser::{DocumentParser, ParserOptions};
pub use pipeline::{ConversionPipeline, PipelineOptions, ProgressEvent};

pub use crate::image::{ImageOptions, ImageProcessor};

use std::path::Path;

/// Convert a PDF file to EPUB with default options.
///
/// Failures fold into the returned result rather than an error so callers
/// always get stage and fallback diagnostics.
///
/// # Example
///
/// ```no_run
/// use bookforge::convert_file;
///
/// let result = convert_file("document.pdf", "document.epub");
/// println!("quality: {:.0}", result.quality_score);
/// ```
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> ConversionResult {
    convert_file_with_options(input, output, PipelineOptions::default())
}

/// Convert a PDF file to EPUB with explicit options.
///
/// # Example
///
/// ```no_run
/// use bookforge::{convert_file_with_options, PipelineOptions, QualityProfile};
///
/// let options = PipelineOptions::new().with_profile(QualityProfile::High);
/// let result = convert_file_with_options("document.pdf", "document.epub", options);
/// assert!(result.quality_score <= 100.0);
/// ```
pub fn convert_file_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: PipelineOptions,
) -> ConversionResult {
    let pipeline = ConversionPipeline::with_options(options);
    pipeline.convert(input.as_ref(), output.as_ref())
}

/// Inspect a PDF without converting it.
///
/// # Example
///
/// ```no_run
/// use bookforge::validate_file;
///
/// let validation = validate_file("document.pdf");
/// println!("{} pages, encrypted: {}", validation.page_count, validation.is_encrypted);
/// ```
pub fn validate_file<P: AsRef<Path>>(path: P) -> PdfValidation {
    parser::validate(path)
}

/// Parse a PDF file into its document model.
///
/// # Example
///
/// ```no_run
/// use bookforge::parse_file;
///
/// let document = parse_file("document.pdf").unwrap();
/// println!("{} runs", document.runs.len());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ParsedDocument> {
    let parser = DocumentParser::open(path)?;
    parser.parse()
}

/// Parse a PDF held in memory.
pub fn parse_bytes(data: &[u8]) -> Result<ParsedDocument> {
    let parser = DocumentParser::from_bytes(data, ParserOptions::default())?;
    parser.parse()
}

/// Extract plain text from a PDF file.
///
/// # Example
///
/// ```no_run
/// use bookforge::extract_text;
///
/// let text = extract_text("document.pdf").unwrap();
/// println!("{}", text);
/// ```
pub fn extract_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let document = parse_file(path)?;
    Ok(document.plain_text())
}
