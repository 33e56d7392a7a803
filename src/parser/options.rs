//! Parsing options and configuration.

/// Error handling mode during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Fail on any error
    Strict,
    /// Skip invalid content and continue
    #[default]
    Lenient,
}

/// Options for parsing PDF documents.
///
/// # Example
///
/// ```
/// use bookforge::parser::ParserOptions;
///
/// let options = ParserOptions::new()
///     .with_images(false)
///     .strict();
/// ```
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Whether to extract embedded images
    pub extract_images: bool,

    /// Skip images smaller than this many pixels on both axes
    pub min_image_dimension: u32,
}

impl ParserOptions {
    /// Create new parser options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable strict mode (fail on the first page error).
    pub fn strict(mut self) -> Self {
        self.error_mode = ErrorMode::Strict;
        self
    }

    /// Enable or disable image extraction.
    pub fn with_images(mut self, extract: bool) -> Self {
        self.extract_images = extract;
        self
    }

    /// Set the minimum image dimension worth extracting.
    pub fn with_min_image_dimension(mut self, pixels: u32) -> Self {
        self.min_image_dimension = pixels;
        self
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Lenient,
            extract_images: true,
            min_image_dimension: 16,
        }
    }
}
