//! PDF parsing module.

pub mod backend;
mod document_parser;
mod options;
mod render;
mod spans;

pub use backend::{ContentOp, LopdfBackend, PdfBackend, PdfValue};
pub use document_parser::{validate, DocumentParser};
pub use options::{ErrorMode, ParserOptions};
pub use render::PageRenderer;
pub use spans::{PageSpans, SpanExtractor};
