//! Pipeline configuration.

use crate::epub::EpubOptions;
use crate::fallback::FallbackOptions;
use crate::model::QualityProfile;
use crate::ocr::OcrOptions;
use crate::parser::ParserOptions;

/// Average extracted characters per page below which recognition runs.
const OCR_TRIGGER_CHARS_PER_PAGE: f64 = 50.0;

/// Options for one conversion run.
///
/// Component options are nested as-is so callers can reach any knob, with
/// the pipeline-level decisions (profile, forced external conversion, the
/// OCR trigger) lifted to the top.
///
/// # Example
///
/// ```
/// use bookforge::model::QualityProfile;
/// use bookforge::pipeline::PipelineOptions;
///
/// let options = PipelineOptions::new()
///     .with_profile(QualityProfile::High)
///     .with_force_external(false);
/// assert_eq!(options.profile, QualityProfile::High);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Image quality profile for the conversion.
    pub profile: QualityProfile,

    /// Skip the custom path and convert with the external tool.
    pub force_external: bool,

    /// Ask the oracle to describe images, when one is attached.
    pub alt_text: bool,

    /// Average extracted characters per page below which OCR runs.
    pub ocr_trigger_chars_per_page: f64,

    /// Parser configuration.
    pub parser: ParserOptions,

    /// OCR configuration.
    pub ocr: OcrOptions,

    /// Output-document configuration.
    pub epub: EpubOptions,

    /// Fallback configuration.
    pub fallback: FallbackOptions,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self {
            profile: QualityProfile::Standard,
            force_external: false,
            alt_text: true,
            ocr_trigger_chars_per_page: OCR_TRIGGER_CHARS_PER_PAGE,
            parser: ParserOptions::default(),
            ocr: OcrOptions::default(),
            epub: EpubOptions::default(),
            fallback: FallbackOptions::default(),
        }
    }

    pub fn with_profile(mut self, profile: QualityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_force_external(mut self, force: bool) -> Self {
        self.force_external = force;
        self
    }

    pub fn with_alt_text(mut self, enabled: bool) -> Self {
        self.alt_text = enabled;
        self
    }

    pub fn with_ocr_trigger(mut self, chars_per_page: f64) -> Self {
        self.ocr_trigger_chars_per_page = chars_per_page;
        self
    }

    pub fn with_parser(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_ocr(mut self, ocr: OcrOptions) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_epub(mut self, epub: EpubOptions) -> Self {
        self.epub = epub;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackOptions) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}
