//! Document-level parsing: metadata, text runs, images, and outline.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::{
    scan_probability, DocumentMetadata, ImageAsset, OutlineEntry, ParsedDocument, PdfValidation,
    Rect,
};
use crate::parser::backend::{decode_text_simple, LopdfBackend, PdfBackend, PageId};
use crate::parser::options::{ErrorMode, ParserOptions};
use crate::parser::spans::SpanExtractor;

/// Upper bound on outline nodes visited, guarding against cyclic trees.
const MAX_OUTLINE_NODES: usize = 4096;

/// Parses a PDF into a [`ParsedDocument`].
///
/// # Example
///
/// ```no_run
/// use bookforge::parser::DocumentParser;
///
/// # fn main() -> bookforge::Result<()> {
/// let parser = DocumentParser::open("book.pdf")?;
/// let document = parser.parse()?;
/// println!("{} pages, {} runs", document.metadata.page_count, document.runs.len());
/// # Ok(())
/// # }
/// ```
pub struct DocumentParser {
    backend: LopdfBackend,
    options: ParserOptions,
}

impl DocumentParser {
    /// Open a PDF file with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a PDF file with explicit options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParserOptions) -> Result<Self> {
        let backend = LopdfBackend::load_file(path)?;
        Ok(Self { backend, options })
    }

    /// Parse a PDF held in memory.
    pub fn from_bytes(data: &[u8], options: ParserOptions) -> Result<Self> {
        let backend = LopdfBackend::load_bytes(data)?;
        Ok(Self { backend, options })
    }

    /// Access the underlying backend.
    pub fn backend(&self) -> &LopdfBackend {
        &self.backend
    }

    /// Whether the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.backend.is_encrypted()
    }

    /// Run the full extraction pass.
    pub fn parse(&self) -> Result<ParsedDocument> {
        if self.backend.is_encrypted() {
            return Err(Error::UnsupportedEncryption);
        }

        let pages = self.backend.pages();
        let page_count = pages.len() as u32;

        let extractor = SpanExtractor::new(&self.backend);
        let mut runs = Vec::new();
        let mut placements: HashMap<u32, HashMap<String, Rect>> = HashMap::new();

        for (&page_num, &page_id) in &pages {
            match extractor.extract_page(page_num, page_id) {
                Ok(spans) => {
                    runs.extend(spans.runs);
                    if !spans.placements.is_empty() {
                        placements.insert(page_num, spans.placements);
                    }
                }
                Err(e) => match self.options.error_mode {
                    ErrorMode::Strict => return Err(e),
                    ErrorMode::Lenient => {
                        log::warn!("skipping page {page_num}: {e}");
                    }
                },
            }
        }

        // Per-page sequences become one global drawing order.
        for (i, run) in runs.iter_mut().enumerate() {
            run.sequence = i as u32;
        }

        let images = if self.options.extract_images {
            self.extract_images(&pages, &placements)
        } else {
            Vec::new()
        };

        let outline = self.extract_outline(&pages);

        let mut metadata = self.extract_metadata(page_count);
        metadata.has_outline = !outline.is_empty();

        let total_chars: usize = runs.iter().map(|r| r.char_count()).sum();
        let avg = if page_count > 0 {
            total_chars as f64 / page_count as f64
        } else {
            0.0
        };
        metadata.scan_probability = scan_probability(avg, page_count);

        Ok(ParsedDocument {
            metadata,
            runs,
            images,
            outline,
        })
    }

    // -- metadata ----------------------------------------------------------

    fn extract_metadata(&self, page_count: u32) -> DocumentMetadata {
        let doc = self.backend.raw_doc();
        let mut metadata = DocumentMetadata {
            page_count,
            encrypted: self.backend.is_encrypted(),
            ..Default::default()
        };

        if let Ok(info_ref) = doc.trailer.get(b"Info") {
            if let Ok(info_id) = info_ref.as_reference() {
                if let Ok(info) = doc.get_dictionary(info_id) {
                    metadata.title = get_string_from_dict(doc, info, b"Title");
                    metadata.author = get_string_from_dict(doc, info, b"Author");
                    metadata.subject = get_string_from_dict(doc, info, b"Subject");
                    metadata.creator = get_string_from_dict(doc, info, b"Creator");
                    metadata.producer = get_string_from_dict(doc, info, b"Producer");
                    metadata.created = get_string_from_dict(doc, info, b"CreationDate")
                        .as_deref()
                        .and_then(parse_pdf_date);
                }
            }
        }

        metadata
    }

    // -- outline -----------------------------------------------------------

    /// Flatten the bookmark tree into (level, title, page) entries in
    /// pre-order. Entries whose destination page cannot be resolved are
    /// dropped.
    fn extract_outline(&self, pages: &BTreeMap<u32, PageId>) -> Vec<OutlineEntry> {
        let doc = self.backend.raw_doc();

        // Page object id → page number, for destination resolution.
        let page_numbers: HashMap<ObjectId, u32> =
            pages.iter().map(|(&num, &id)| (id, num)).collect();

        let first = doc
            .catalog()
            .ok()
            .and_then(|catalog| catalog.get(b"Outlines").ok())
            .and_then(|o| o.as_reference().ok())
            .and_then(|id| doc.get_dictionary(id).ok())
            .and_then(|outlines| outlines.get(b"First").ok())
            .and_then(|o| o.as_reference().ok());

        let mut entries = Vec::new();
        if let Some(first_id) = first {
            let mut visited = HashSet::new();
            self.walk_outline(doc, first_id, 0, &page_numbers, &mut entries, &mut visited);
        }
        entries
    }

    fn walk_outline(
        &self,
        doc: &LopdfDocument,
        mut node_id: ObjectId,
        level: u8,
        page_numbers: &HashMap<ObjectId, u32>,
        entries: &mut Vec<OutlineEntry>,
        visited: &mut HashSet<ObjectId>,
    ) {
        loop {
            if !visited.insert(node_id) || visited.len() > MAX_OUTLINE_NODES {
                return;
            }

            let Ok(node) = doc.get_dictionary(node_id) else {
                return;
            };

            let title = node
                .get(b"Title")
                .ok()
                .and_then(|o| match o {
                    Object::String(bytes, _) => Some(decode_text_simple(bytes)),
                    _ => None,
                })
                .unwrap_or_default();

            if let Some(page) = resolve_destination_page(doc, node, page_numbers) {
                if !title.trim().is_empty() {
                    entries.push(OutlineEntry { level, title, page });
                }
            } else {
                log::debug!("outline entry '{title}' has no resolvable destination");
            }

            if let Some(child) = node
                .get(b"First")
                .ok()
                .and_then(|o| o.as_reference().ok())
            {
                self.walk_outline(doc, child, level + 1, page_numbers, entries, visited);
            }

            match node.get(b"Next").ok().and_then(|o| o.as_reference().ok()) {
                Some(next) => node_id = next,
                None => return,
            }
        }
    }

    // -- images ------------------------------------------------------------

    /// Extract image XObjects page by page. JPEG streams pass through as-is;
    /// uncompressed RGB/Gray samples are wrapped into PNG. Anything else is
    /// kept raw for downstream best effort.
    fn extract_images(
        &self,
        pages: &BTreeMap<u32, PageId>,
        placements: &HashMap<u32, HashMap<String, Rect>>,
    ) -> Vec<ImageAsset> {
        let doc = self.backend.raw_doc();
        let mut images = Vec::new();

        for (&page_num, &page_id) in pages {
            let Ok(page_dict) = doc.get_dictionary(page_id) else {
                continue;
            };
            let Some(resources) = resolve_dict(doc, page_dict.get(b"Resources").ok()) else {
                continue;
            };
            let Some(xobjects) = resolve_dict(doc, resources.get(b"XObject").ok()) else {
                continue;
            };

            let page_size = self.backend.page_size(page_id).unwrap_or((612.0, 792.0));
            let page_placements = placements.get(&page_num);

            for (name, obj) in xobjects.iter() {
                let Ok(stream_id) = obj.as_reference() else {
                    continue;
                };
                let Ok(Object::Stream(stream)) = doc.get_object(stream_id) else {
                    continue;
                };

                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    == Some(b"Image".as_ref());
                if !is_image {
                    continue;
                }

                let width = get_dict_u32(&stream.dict, b"Width").unwrap_or(0);
                let height = get_dict_u32(&stream.dict, b"Height").unwrap_or(0);
                if width < self.options.min_image_dimension
                    && height < self.options.min_image_dimension
                {
                    continue;
                }

                let has_alpha = stream.dict.get(b"SMask").is_ok();
                let color_space = resolve_color_space(doc, &stream.dict);

                let Some((data, encoding)) =
                    decode_image_stream(stream, width, height, color_space.as_deref())
                else {
                    continue;
                };

                let resource_name = String::from_utf8_lossy(name).to_string();
                let bbox = page_placements
                    .and_then(|p| p.get(&resource_name).copied())
                    .unwrap_or(Rect {
                        x0: 0.0,
                        y0: 0.0,
                        x1: page_size.0,
                        y1: page_size.1,
                    });

                let id = format!("p{}_{}", page_num, sanitize_name(&resource_name));
                images.push(ImageAsset {
                    id,
                    page: page_num,
                    bbox,
                    width,
                    height,
                    encoding,
                    data,
                    has_alpha,
                    color_space,
                });
            }
        }

        log::debug!("extracted {} embedded images", images.len());
        images
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Inspect a PDF without running the full extraction pass.
///
/// Never returns an error: failures are reported through the
/// [`PdfValidation::error`] field with `is_valid` false.
pub fn validate<P: AsRef<Path>>(path: P) -> PdfValidation {
    let path = path.as_ref();
    let mut validation = PdfValidation::default();

    let Ok(meta) = std::fs::metadata(path) else {
        validation.error = Some(format!("file not found: {}", path.display()));
        return validation;
    };
    validation.file_size = meta.len();

    match std::fs::read(path) {
        Ok(data) => {
            if !data.starts_with(b"%PDF-") {
                validation.error = Some("missing %PDF header".to_string());
                return validation;
            }
            validate_bytes(&data, validation)
        }
        Err(e) => {
            validation.error = Some(e.to_string());
            validation
        }
    }
}

fn validate_bytes(data: &[u8], mut validation: PdfValidation) -> PdfValidation {
    let backend = match LopdfBackend::load_bytes(data) {
        Ok(b) => b,
        Err(Error::UnsupportedEncryption) => {
            validation.is_valid = true;
            validation.is_encrypted = true;
            return validation;
        }
        Err(e) => {
            validation.error = Some(e.to_string());
            return validation;
        }
    };

    let pages = backend.pages();
    validation.page_count = pages.len() as u32;
    validation.is_encrypted = backend.is_encrypted();
    validation.is_valid = !pages.is_empty();
    if pages.is_empty() {
        validation.error = Some("document has no pages".to_string());
    }

    validation.has_outline = backend
        .raw_doc()
        .catalog()
        .ok()
        .and_then(|c| c.get(b"Outlines").ok())
        .is_some();

    // Sample the first page for usable text.
    if validation.is_valid && !validation.is_encrypted {
        let extractor = SpanExtractor::new(&backend);
        if let Some((&page_num, &page_id)) = pages.iter().next() {
            if let Ok(spans) = extractor.extract_page(page_num, page_id) {
                let chars: usize = spans.runs.iter().map(|r| r.char_count()).sum();
                validation.has_text = chars > 10;
            }
        }
    }

    validation
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a string value from a dictionary, following one reference hop.
fn get_string_from_dict(
    doc: &LopdfDocument,
    dict: &Dictionary,
    key: &[u8],
) -> Option<String> {
    let obj = dict.get(key).ok()?;
    let text = match obj {
        Object::String(bytes, _) => decode_text_simple(bytes),
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::String(bytes, _) => decode_text_simple(bytes),
            _ => return None,
        },
        _ => return None,
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse a PDF date string like `D:20240115103000+09'00'`.
fn parse_pdf_date(date_str: &str) -> Option<DateTime<Utc>> {
    let s = date_str.strip_prefix("D:").unwrap_or(date_str);
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();

    if digits.len() >= 14 {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&digits[..14], "%Y%m%d%H%M%S") {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    if digits.len() >= 8 {
        if let Ok(d) = NaiveDate::parse_from_str(&digits[..8], "%Y%m%d") {
            return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }
    None
}

/// Resolve an outline node's destination to a page number.
///
/// Handles direct `Dest` arrays and `A` (GoTo action) dictionaries.
/// Named destinations are not resolved.
fn resolve_destination_page(
    doc: &LopdfDocument,
    node: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    if let Ok(dest) = node.get(b"Dest") {
        return dest_array_page(doc, dest, page_numbers);
    }

    if let Some(action) = resolve_dict(doc, node.get(b"A").ok()) {
        let is_goto = action
            .get(b"S")
            .ok()
            .and_then(|o| o.as_name().ok())
            == Some(b"GoTo".as_ref());
        if is_goto {
            if let Ok(dest) = action.get(b"D") {
                return dest_array_page(doc, dest, page_numbers);
            }
        }
    }

    None
}

fn dest_array_page(
    doc: &LopdfDocument,
    dest: &Object,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    let array = match dest {
        Object::Array(a) => a,
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::Array(a) => a,
            _ => return None,
        },
        _ => return None,
    };
    let page_ref = array.first()?.as_reference().ok()?;
    page_numbers.get(&page_ref).copied()
}

/// Resolve an object to a dictionary, following one reference hop.
fn resolve_dict<'a>(doc: &'a LopdfDocument, obj: Option<&'a Object>) -> Option<&'a Dictionary> {
    match obj? {
        Object::Dictionary(d) => Some(d),
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

fn get_dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key).ok().and_then(|o| o.as_i64().ok()).map(|v| v as u32)
}

/// Resolve the image color space to a simple name.
fn resolve_color_space(doc: &LopdfDocument, dict: &Dictionary) -> Option<String> {
    let obj = dict.get(b"ColorSpace").ok()?;
    let obj = match obj {
        Object::Reference(r) => doc.get_object(*r).ok()?,
        other => other,
    };
    match obj {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        // ICCBased: [/ICCBased stream], component count N in the stream dict
        Object::Array(arr) => {
            let leading = arr.first()?.as_name().ok()?;
            if leading == b"ICCBased" {
                let stream_id = arr.get(1)?.as_reference().ok()?;
                if let Ok(Object::Stream(s)) = doc.get_object(stream_id) {
                    return match s.dict.get(b"N").ok().and_then(|o| o.as_i64().ok()) {
                        Some(1) => Some("DeviceGray".to_string()),
                        Some(3) => Some("DeviceRGB".to_string()),
                        Some(4) => Some("DeviceCMYK".to_string()),
                        _ => None,
                    };
                }
                None
            } else {
                Some(String::from_utf8_lossy(leading).to_string())
            }
        }
        _ => None,
    }
}

/// Turn a stream into usable image bytes with an encoding tag.
fn decode_image_stream(
    stream: &lopdf::Stream,
    width: u32,
    height: u32,
    color_space: Option<&str>,
) -> Option<(Vec<u8>, String)> {
    let filter = stream
        .dict
        .get(b"Filter")
        .ok()
        .and_then(|o| match o {
            Object::Name(n) => Some(vec![n.clone()]),
            Object::Array(arr) => Some(
                arr.iter()
                    .filter_map(|f| f.as_name().ok().map(|n| n.to_vec()))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    if filter.iter().any(|f| f == b"DCTDecode") {
        // Already a JPEG; pass the compressed stream through untouched.
        return Some((stream.content.clone(), "jpeg".to_string()));
    }

    let bpc = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    let Ok(raw) = stream.decompressed_content() else {
        return Some((stream.content.clone(), "raw".to_string()));
    };

    if bpc == 8 && width > 0 && height > 0 {
        if let Some(png) = wrap_raw_as_png(&raw, width, height, color_space) {
            return Some((png, "png".to_string()));
        }
    }

    Some((raw, "raw".to_string()))
}

/// Wrap uncompressed 8-bit RGB or grayscale samples into a PNG.
fn wrap_raw_as_png(
    raw: &[u8],
    width: u32,
    height: u32,
    color_space: Option<&str>,
) -> Option<Vec<u8>> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    let cs = color_space.unwrap_or("DeviceRGB");

    let dynamic = if cs.contains("RGB") && raw.len() >= pixels * 3 {
        image::RgbImage::from_raw(width, height, raw[..pixels * 3].to_vec())
            .map(image::DynamicImage::ImageRgb8)?
    } else if cs.contains("Gray") && raw.len() >= pixels {
        image::GrayImage::from_raw(width, height, raw[..pixels].to_vec())
            .map(image::DynamicImage::ImageLuma8)?
    } else {
        return None;
    };

    let mut png = Vec::new();
    dynamic
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .ok()?;
    Some(png)
}

/// Keep only characters that are safe inside archive member names.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "x".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pdf_date_full() {
        let dt = parse_pdf_date("D:20240115103000+09'00'").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 10:30:00");
    }

    #[test]
    fn test_parse_pdf_date_date_only() {
        let dt = parse_pdf_date("D:20230601").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2023-06-01");
    }

    #[test]
    fn test_parse_pdf_date_invalid() {
        assert!(parse_pdf_date("garbage").is_none());
        assert!(parse_pdf_date("D:2024").is_none());
    }

    #[test]
    fn test_validate_missing_file() {
        let validation = validate("/nonexistent/file.pdf");
        assert!(!validation.is_valid);
        assert!(validation.error.is_some());
    }

    #[test]
    fn test_validate_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_pdf.pdf");
        std::fs::write(&path, b"hello world").unwrap();

        let validation = validate(&path);
        assert!(!validation.is_valid);
        assert!(validation.error.unwrap().contains("%PDF"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Im1"), "Im1");
        assert_eq!(sanitize_name("X/Obj 2"), "X_Obj_2");
        assert_eq!(sanitize_name(""), "x");
    }

    #[test]
    fn test_wrap_raw_as_png_rgb() {
        let raw = vec![255u8; 4 * 4 * 3];
        let png = wrap_raw_as_png(&raw, 4, 4, Some("DeviceRGB")).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_wrap_raw_as_png_rejects_short_buffer() {
        let raw = vec![255u8; 10];
        assert!(wrap_raw_as_png(&raw, 4, 4, Some("DeviceRGB")).is_none());
    }
}
