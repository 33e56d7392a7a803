//! PDF backend abstraction layer.
//!
//! Provides a trait-based interface for PDF operations, isolating
//! the concrete PDF library (lopdf) from span extraction and parsing logic.

use std::collections::BTreeMap;

use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Page identifier: (object number, generation number).
pub type PageId = (u32, u16);

/// Font information returned by the backend.
#[derive(Debug, Clone)]
pub struct BackendFontInfo {
    /// Font resource name (key in the page's font dictionary).
    pub name: Vec<u8>,
    /// Base font name (e.g., "Helvetica-Bold").
    pub base_font: String,
}

/// A value from a PDF content stream operand.
#[derive(Debug, Clone)]
pub enum PdfValue {
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Other,
}

impl PdfValue {
    /// The operand as a number, when it is one.
    pub fn as_number(&self) -> Option<f32> {
        match self {
            PdfValue::Integer(i) => Some(*i as f32),
            PdfValue::Real(r) => Some(*r),
            _ => None,
        }
    }
}

/// A single operation from a PDF content stream.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

/// Abstract interface for PDF document access.
///
/// Implementations provide page enumeration, font info, content stream
/// decoding, and text decoding without exposing concrete PDF library types.
pub trait PdfBackend {
    /// Return all pages as (page_number → PageId).
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Return the page's media box size as (width, height) in points.
    fn page_size(&self, page: PageId) -> Result<(f32, f32)>;

    /// Return font info for a given page.
    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>>;

    /// Return the raw (decompressed) content stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>>;

    /// Parse raw content stream bytes into a sequence of operations.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>>;

    /// Decode a text byte sequence using the font's encoding on the given page.
    /// Falls back to simple decoding if the font or encoding is unavailable.
    fn decode_text(&self, page: PageId, font_name: &[u8], bytes: &[u8]) -> String;
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // Try UTF-16BE first (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|c| {
                if c.len() == 2 {
                    Some(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    None
                }
            })
            .collect();
        return normalize(String::from_utf16(&utf16).unwrap_or_default());
    }

    // Try UTF-8
    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return normalize(s);
    }

    // Fallback: Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

/// Recompose combining sequences to NFC so titles and body text from
/// different fonts compare by code point.
fn normalize(text: String) -> String {
    if text.is_ascii() {
        return text;
    }
    text.nfc().collect()
}

// ---------------------------------------------------------------------------
// LopdfBackend: concrete implementation backed by lopdf
// ---------------------------------------------------------------------------

use lopdf::{Document as LopdfDocument, Object};

/// Concrete [`PdfBackend`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
}

impl LopdfBackend {
    /// Load from a file path.
    pub fn load_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let doc = LopdfDocument::load(path).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::UnsupportedEncryption,
            _ => Error::from(e),
        })?;
        Ok(Self { doc })
    }

    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::UnsupportedEncryption,
            _ => Error::from(e),
        })?;
        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    ///
    /// Escape hatch for operations not covered by `PdfBackend`
    /// (metadata, outlines, image resource extraction).
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Check if the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.doc.is_encrypted()
    }

    /// Get PDF version string.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    /// Decompressed bytes of one referenced content stream.
    fn stream_bytes(&self, id: lopdf::ObjectId) -> Result<Vec<u8>> {
        self.doc
            .get_object(id)
            .and_then(Object::as_stream)
            .and_then(lopdf::Stream::get_plain_content)
            .map_err(|e| Error::ParseFailure(e.to_string()))
    }
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_size(&self, page: PageId) -> Result<(f32, f32)> {
        if let Ok(page_dict) = self.doc.get_dictionary(page) {
            if let Ok(media_box) = page_dict.get(b"MediaBox") {
                if let Ok(array) = media_box.as_array() {
                    if array.len() >= 4 {
                        let width = array[2].as_float().unwrap_or(612.0);
                        let height = array[3].as_float().unwrap_or(792.0);
                        return Ok((width, height));
                    }
                }
            }
        }

        // Default to Letter size
        Ok((612.0, 792.0))
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>> {
        let lopdf_fonts = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| Error::ParseFailure(e.to_string()))?;

        let mut result = Vec::with_capacity(lopdf_fonts.len());
        for (name, font_dict) in &lopdf_fonts {
            let base_font = font_dict
                .get(b"BaseFont")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            result.push(BackendFontInfo {
                name: name.clone(),
                base_font,
            });
        }
        Ok(result)
    }

    fn page_content(&self, page_id: PageId) -> Result<Vec<u8>> {
        let contents = self
            .doc
            .get_dictionary(page_id)
            .and_then(|dict| dict.get(b"Contents"))
            .map_err(|e| Error::ParseFailure(e.to_string()))?;

        match contents {
            Object::Reference(id) => self.stream_bytes(*id),
            // Multiple streams form one logical stream; a space keeps
            // tokens at the seams apart.
            Object::Array(arr) => {
                let mut content = Vec::new();
                for id in arr.iter().filter_map(|obj| obj.as_reference().ok()) {
                    if let Ok(data) = self.stream_bytes(id) {
                        content.extend_from_slice(&data);
                        content.push(b' ');
                    }
                }
                Ok(content)
            }
            _ => Err(Error::ParseFailure(
                "page contents is neither a stream nor an array".to_string(),
            )),
        }
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>> {
        let content = lopdf::content::Content::decode(data)
            .map_err(|e| Error::ParseFailure(e.to_string()))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(PdfValue::from).collect(),
            })
            .collect())
    }

    fn decode_text(&self, page: PageId, font_name: &[u8], bytes: &[u8]) -> String {
        if let Ok(lopdf_fonts) = self.doc.get_page_fonts(page) {
            if let Some(font_dict) = lopdf_fonts.get(font_name) {
                if let Ok(enc) = font_dict.get_font_encoding(&self.doc) {
                    if let Ok(text) = LopdfDocument::decode_text(&enc, bytes) {
                        return normalize(text);
                    }
                }
            }
        }
        decode_text_simple(bytes)
    }
}

impl From<&Object> for PdfValue {
    fn from(obj: &Object) -> Self {
        match obj {
            Object::Integer(i) => PdfValue::Integer(*i),
            Object::Real(r) => PdfValue::Real(*r),
            Object::Name(n) => PdfValue::Name(n.clone()),
            Object::String(b, _) => PdfValue::Str(b.clone()),
            Object::Array(arr) => PdfValue::Array(arr.iter().map(PdfValue::from).collect()),
            _ => PdfValue::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_simple_utf8() {
        assert_eq!(decode_text_simple(b"Hello"), "Hello");
    }

    #[test]
    fn test_decode_text_simple_latin1() {
        // 0xE9 = 'é' in Latin-1
        let bytes = vec![0x48, 0x65, 0x6C, 0x6C, 0xE9];
        let text = decode_text_simple(&bytes);
        assert_eq!(text, "Hellé");
    }

    #[test]
    fn test_decode_text_simple_utf16be() {
        // UTF-16BE BOM + "Hi"
        let bytes = vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_text_simple(&bytes), "Hi");
    }

    #[test]
    fn test_decoded_text_recomposed_to_nfc() {
        // UTF-16BE BOM + "e" + combining acute accent
        let bytes = vec![0xFE, 0xFF, 0x00, 0x65, 0x03, 0x01];
        let text = decode_text_simple(&bytes);
        assert_eq!(text, "\u{e9}");
        assert_eq!(text.chars().count(), 1);
    }

    #[test]
    fn test_value_as_number() {
        assert_eq!(PdfValue::Integer(42).as_number(), Some(42.0));
        assert_eq!(PdfValue::Real(3.5).as_number(), Some(3.5));
        assert_eq!(PdfValue::Other.as_number(), None);
    }

    #[test]
    fn test_operand_conversion_recurses_into_arrays() {
        let obj = Object::Array(vec![
            Object::Integer(1),
            Object::Real(2.5),
            Object::Boolean(true),
        ]);
        let PdfValue::Array(items) = PdfValue::from(&obj) else {
            panic!("expected an array operand");
        };
        assert!(matches!(items[0], PdfValue::Integer(1)));
        assert!(matches!(items[1], PdfValue::Real(v) if v == 2.5));
        assert!(matches!(items[2], PdfValue::Other));
    }
}
