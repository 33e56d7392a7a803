//! OCR result types and rendered-page input.

use serde::{Deserialize, Serialize};

/// Dominant script detected on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptTag {
    /// Latin scripts, recognized with the default model
    #[default]
    Latin,
    /// CJK ideographs, recognized with the combined Chinese models
    Cjk,
}

impl ScriptTag {
    /// Engine language tags for this script.
    pub fn model_tags(&self) -> &'static str {
        match self {
            ScriptTag::Latin => "eng",
            ScriptTag::Cjk => "chi_sim+chi_tra",
        }
    }
}

/// A recognized word with its confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// Confidence in [0, 100]
    pub confidence: f64,
}

/// Recognition output for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    /// Recognized text, words joined in stream order
    pub text: String,

    /// Mean word confidence in [0, 100]; 0.0 when no words were found
    pub confidence: f64,

    /// Script the full pass ran under
    pub script: ScriptTag,

    /// Per-word results
    pub words: Vec<OcrWord>,
}

impl OcrResult {
    /// Mean confidence over a word list, 0.0 for an empty list.
    pub fn mean_confidence(words: &[OcrWord]) -> f64 {
        if words.is_empty() {
            return 0.0;
        }
        words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64
    }
}

/// OCR output for one page, with provenance and warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOcrResult {
    /// Page number (1-indexed)
    pub page: u32,

    /// Recognition result
    pub result: OcrResult,

    /// Resolution the page was rendered at (dots per inch)
    pub dpi: u32,

    /// Non-fatal conditions (low confidence, preprocessing skips)
    pub warnings: Vec<String>,
}

/// A page rasterized for recognition.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page number (1-indexed)
    pub page: u32,

    /// Render resolution in dots per inch
    pub dpi: u32,

    /// Decoded RGB image
    pub image: image::RgbImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
