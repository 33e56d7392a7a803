//! Error types for the bookforge library.

use std::io;
use thiserror::Error;

/// Result type alias for bookforge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during conversion.
///
/// Each component reports through one of these variants; the pipeline
/// catches them at stage boundaries and uses them to decide whether the
/// external fallback should take over.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source could not be opened or its structure is unreadable.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The document is password-protected and cannot be read.
    #[error("Document is encrypted")]
    UnsupportedEncryption,

    /// Text extraction produced too little content to work with.
    ///
    /// Non-fatal: the pipeline responds by invoking OCR.
    #[error("Extraction degraded: {chars_per_page:.0} chars/page on {page_count} pages")]
    ExtractionDegraded { chars_per_page: f64, page_count: u32 },

    /// Chapter structure was recovered but with low confidence.
    ///
    /// Non-fatal: recorded in diagnostics and reflected in the quality score.
    #[error("Structure confidence {confidence:.0} below {threshold:.0}")]
    StructureLowConfidence { confidence: f64, threshold: f64 },

    /// The output document could not be assembled or written.
    #[error("Generation failure: {0}")]
    GenerationFailure(String),

    /// An external tool required for this operation is not installed.
    #[error("External tool unavailable: {tool}")]
    ExternalToolUnavailable { tool: String },

    /// An external tool exceeded its wall-clock budget and was killed.
    #[error("{tool} timed out after {seconds}s")]
    ExternalToolTimeout { tool: String, seconds: u64 },

    /// An external tool ran but failed.
    #[error("{tool} failed: {message}")]
    ExternalToolError { tool: String, message: String },

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Error decoding or re-encoding a raster image.
    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl Error {
    /// Whether this error still allows the custom pipeline to continue.
    ///
    /// Degraded extraction and low structure confidence are working
    /// conditions, not stop conditions.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ExtractionDegraded { .. } | Error::StructureLowConfidence { .. }
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::UnsupportedEncryption,
            _ => Error::ParseFailure(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageProcessing(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::GenerationFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedEncryption;
        assert_eq!(err.to_string(), "Document is encrypted");

        let err = Error::PageOutOfRange(10, 5);
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );

        let err = Error::ExternalToolTimeout {
            tool: "ebook-convert".to_string(),
            seconds: 300,
        };
        assert_eq!(err.to_string(), "ebook-convert timed out after 300s");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_recoverable() {
        let degraded = Error::ExtractionDegraded {
            chars_per_page: 12.0,
            page_count: 40,
        };
        assert!(degraded.is_recoverable());
        assert!(!Error::UnsupportedEncryption.is_recoverable());
    }
}
