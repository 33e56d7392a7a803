//! Data model for the conversion pipeline.
//!
//! These types are created fresh per conversion request and flow one way
//! through the stages: parser output feeds layout, OCR and chapter
//! detection; processed images and chapters feed document generation.

mod chapter;
mod document;
mod epub;
mod image;
mod layout;
mod ocr;
mod result;

pub use chapter::{
    BoundaryGeometry, ChapterBoundary, ChapterStructure, DetectionMethod,
};
pub use document::{
    is_bold_font, scan_probability, DocumentMetadata, ImageAsset, OutlineEntry, ParsedDocument,
    PdfValidation, Rect, TextRun,
};
pub use epub::{OutputChapter, OutputMetadata};
pub use image::{
    ImageClass, ImageEncoding, ProcessedImage, QualityProfile, TextPosition,
};
pub use layout::{LayoutColumn, PageLayout, RegionKind, TableRegion, TextRegion};
pub use ocr::{OcrResult, OcrWord, PageOcrResult, RenderedPage, ScriptTag};
pub use result::{
    ConversionMethod, ConversionResult, FallbackIndicators, FallbackResult, PipelineStage,
};
