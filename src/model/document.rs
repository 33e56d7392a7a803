//! Parsed-document types: metadata, positioned text runs, embedded images.
//!
//! All geometry uses a top-left origin (y grows downward), normalized from
//! PDF user space at extraction time so that downstream heuristics can
//! reason about "top of page" directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Union of two rects.
    pub fn merge(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Document-level metadata captured once per parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Creator application
    pub creator: Option<String>,

    /// PDF producer
    pub producer: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Total number of pages
    pub page_count: u32,

    /// Whether the document is encrypted
    pub encrypted: bool,

    /// Whether the document carries an outline (bookmarks)
    pub has_outline: bool,

    /// Estimated probability that the document is a scan, in [0, 1]
    pub scan_probability: f64,
}

impl DocumentMetadata {
    /// Whether both title and author are known.
    pub fn has_title_and_author(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
            && self.author.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Estimate scan probability from average extracted characters per page.
///
/// Bands are empirical: dense machine text yields hundreds of characters
/// per page, while an unrecognized scan yields nearly none.
pub fn scan_probability(avg_chars_per_page: f64, page_count: u32) -> f64 {
    if page_count == 0 {
        return 1.0;
    }
    if avg_chars_per_page < 50.0 {
        0.9
    } else if avg_chars_per_page < 100.0 {
        0.6
    } else if avg_chars_per_page < 200.0 {
        0.3
    } else {
        0.1
    }
}

/// A positioned text span with resolved font attributes.
///
/// Owned by the page that produced it; read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRun {
    /// The text content
    pub text: String,

    /// Bounding box (top-left origin)
    pub bbox: Rect,

    /// Base font name (e.g., "Helvetica-Bold")
    pub font_name: String,

    /// Font size in points
    pub font_size: f32,

    /// Whether the font appears to be bold
    pub is_bold: bool,

    /// Page number (1-indexed)
    pub page: u32,

    /// Extraction sequence id, increasing in content-stream order
    pub sequence: u32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: Rect, page: u32, sequence: u32) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_name: String::new(),
            font_size: 12.0,
            is_bold: false,
            page,
            sequence,
        }
    }

    /// Set the font name, deriving the bold flag from it.
    pub fn with_font(mut self, name: impl Into<String>, size: f32) -> Self {
        let name = name.into();
        self.is_bold = is_bold_font(&name);
        self.font_name = name;
        self.font_size = size;
        self
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Whether a font name indicates a bold face.
pub fn is_bold_font(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("bold") || lower.contains("black") || lower.contains("heavy")
}

/// An embedded raster image extracted from the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Identifier, unique within the document (e.g., "p3_Im1")
    pub id: String,

    /// Page number (1-indexed)
    pub page: u32,

    /// Placement rectangle on the page (top-left origin)
    pub bbox: Rect,

    /// Pixel width
    pub width: u32,

    /// Pixel height
    pub height: u32,

    /// Source encoding as stored in the PDF ("jpeg", "png", "raw")
    pub encoding: String,

    /// Raw image bytes
    #[serde(skip_serializing, default)]
    pub data: Vec<u8>,

    /// Whether the image carries an alpha channel or soft mask
    pub has_alpha: bool,

    /// Color space name if known (e.g., "DeviceRGB")
    pub color_space: Option<String>,
}

impl ImageAsset {
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

/// A flattened outline (bookmark) entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Nesting level (0 = top level)
    pub level: u8,

    /// Entry title
    pub title: String,

    /// Target page number (1-indexed)
    pub page: u32,
}

/// Lightweight validation result used for the pipeline entry decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfValidation {
    /// Whether the container opened and has at least one page
    pub is_valid: bool,

    /// Page count (0 when unreadable)
    pub page_count: u32,

    /// Whether the document is encrypted
    pub is_encrypted: bool,

    /// Whether an outline is present
    pub has_outline: bool,

    /// Source file size in bytes
    pub file_size: u64,

    /// Whether a first-page text sample yielded more than a few characters
    pub has_text: bool,

    /// Failure reason when not valid
    pub error: Option<String>,
}

/// Full parse output: metadata, ordered runs, images, and outline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub metadata: DocumentMetadata,

    /// All text runs across the document, in page order
    pub runs: Vec<TextRun>,

    /// Embedded raster images
    pub images: Vec<ImageAsset>,

    /// Flattened outline entries
    pub outline: Vec<OutlineEntry>,
}

impl ParsedDocument {
    /// Runs belonging to one page, in extraction order.
    pub fn runs_for_page(&self, page: u32) -> Vec<&TextRun> {
        self.runs.iter().filter(|r| r.page == page).collect()
    }

    /// Concatenated text of one page.
    pub fn page_text(&self, page: u32) -> String {
        self.runs_for_page(page)
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Average extracted characters per page, 0.0 for an empty document.
    pub fn avg_chars_per_page(&self) -> f64 {
        if self.metadata.page_count == 0 {
            return 0.0;
        }
        let total: usize = self.runs.iter().map(|r| r.char_count()).sum();
        total as f64 / self.metadata.page_count as f64
    }

    /// Concatenated text of the whole document.
    pub fn plain_text(&self) -> String {
        let mut pages: Vec<String> = Vec::new();
        for page in 1..=self.metadata.page_count {
            let text = self.page_text(page);
            if !text.trim().is_empty() {
                pages.push(text);
            }
        }
        pages.join("\n\n")
    }
}
