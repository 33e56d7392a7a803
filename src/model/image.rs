//! Processed-image types and quality profiles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::document::Rect;

/// Named preset controlling image resolution and compression trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Fast,
    #[default]
    Standard,
    High,
}

impl QualityProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityProfile::Fast => "fast",
            QualityProfile::Standard => "standard",
            QualityProfile::High => "high",
        }
    }
}

impl FromStr for QualityProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(QualityProfile::Fast),
            "standard" => Ok(QualityProfile::Standard),
            "high" => Ok(QualityProfile::High),
            other => Err(format!("unknown quality profile: {}", other)),
        }
    }
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content classification driving the re-encoding choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageClass {
    /// Continuous-tone content, encoded as JPEG
    Photographic,
    /// Line art and small-palette content, encoded as PNG
    Diagrammatic,
}

/// Target encoding after re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

impl ImageEncoding {
    pub fn media_type(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
            ImageEncoding::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Png => "png",
        }
    }
}

/// Relative position of an image against its nearest text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    /// The nearest text starts above the image
    After,
    /// The nearest text starts below the image
    Before,
}

/// A re-encoded image ready for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Identifier carried over from the source asset
    pub id: String,

    /// Processed image bytes
    #[serde(skip_serializing, default)]
    pub data: Vec<u8>,

    /// Source encoding as extracted
    pub original_encoding: String,

    /// Encoding after processing
    pub encoding: ImageEncoding,

    /// Classification that drove the encoding choice
    pub class: ImageClass,

    /// Pixel size as extracted
    pub original_width: u32,
    pub original_height: u32,

    /// Pixel size after resizing
    pub width: u32,
    pub height: u32,

    /// Byte size as extracted
    pub original_size: usize,

    /// Byte size after processing
    pub processed_size: usize,

    /// processed_size / original_size
    pub compression_ratio: f64,

    /// Page the image came from (1-indexed)
    pub page: u32,

    /// Placement rectangle on the source page
    pub bbox: Rect,

    /// Oracle-provided description, when available
    pub alt_text: Option<String>,

    /// Nearby text joined for captioning context
    pub associated_text: Option<String>,

    /// Where the image sits relative to its nearest text
    pub text_position: Option<TextPosition>,

    /// Profile active during processing
    pub profile: QualityProfile,
}

impl ProcessedImage {
    /// File name used inside the output package.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.encoding.extension())
    }
}
