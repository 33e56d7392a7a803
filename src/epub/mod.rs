//! EPUB 3 package assembly.
//!
//! Writes the container directly with the `zip` crate: `mimetype` first
//! and uncompressed, then the container descriptor, package document,
//! navigation, stylesheet, chapter markup, and images.

mod xhtml;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::model::{
    ChapterBoundary, OutputChapter, OutputMetadata, ParsedDocument, ProcessedImage,
};

/// Generator configuration.
#[derive(Debug, Clone)]
pub struct EpubOptions {
    /// Language tag used when detection finds no CJK text.
    pub default_language: String,

    /// Optional explicit navigation order by chapter title.
    pub toc_titles: Option<Vec<String>>,
}

impl EpubOptions {
    pub fn new() -> Self {
        Self {
            default_language: "en".to_string(),
            toc_titles: None,
        }
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn with_toc_order(mut self, titles: Vec<String>) -> Self {
        self.toc_titles = Some(titles);
        self
    }
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles chapters, metadata, and images into an EPUB file.
pub struct DocumentGenerator {
    options: EpubOptions,
}

impl DocumentGenerator {
    pub fn new() -> Self {
        Self::with_options(EpubOptions::new())
    }

    pub fn with_options(options: EpubOptions) -> Self {
        Self { options }
    }

    /// Write the complete package to `output_path`.
    pub fn generate(
        &self,
        output_path: &Path,
        chapters: &[OutputChapter],
        metadata: &OutputMetadata,
        images: &[ProcessedImage],
    ) -> Result<()> {
        if chapters.is_empty() {
            return Err(Error::GenerationFailure("no chapters to package".into()));
        }

        log::info!(
            "generating EPUB: {} chapters, {} images -> {}",
            chapters.len(),
            images.len(),
            output_path.display()
        );

        let file = File::create(output_path)?;
        let mut zip = ZipWriter::new(file);

        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

        // The mimetype entry must come first and stay uncompressed so
        // readers can sniff the container type.
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(xhtml::CONTAINER_XML.as_bytes())?;

        let stylesheet = if metadata.language.contains("zh") {
            xhtml::CJK_STYLESHEET
        } else {
            xhtml::LATIN_STYLESHEET
        };
        zip.start_file("OEBPS/styles/stylesheet.css", deflated)?;
        zip.write_all(stylesheet.as_bytes())?;

        let image_entries: Vec<xhtml::ImageManifestEntry> = images
            .iter()
            .map(|image| xhtml::ImageManifestEntry {
                id: image.id.clone(),
                href: format!("images/{}", image.file_name()),
                media_type: sniff_media_type(&image.data),
            })
            .collect();

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(xhtml::content_opf(metadata, chapters, &image_entries).as_bytes())?;

        let nav_entries = self.navigation_entries(chapters);
        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(xhtml::nav_xhtml(&metadata.title, &nav_entries).as_bytes())?;

        let assigned = assign_images(chapters, images);
        for (chapter, chapter_images) in chapters.iter().zip(&assigned) {
            zip.start_file(format!("OEBPS/{}", chapter.file_name), deflated)?;
            zip.write_all(xhtml::chapter_document(chapter, chapter_images).as_bytes())?;
        }

        for image in images {
            zip.start_file(format!("OEBPS/images/{}", image.file_name()), deflated)?;
            zip.write_all(&image.data)?;
        }

        zip.finish()?;
        log::info!("EPUB written: {}", output_path.display());
        Ok(())
    }

    /// Build chapters by slicing page text at the detected boundaries.
    ///
    /// Without boundaries the whole document becomes one chapter titled
    /// after the source metadata.
    pub fn chapters_from_runs(
        &self,
        document: &ParsedDocument,
        boundaries: &[ChapterBoundary],
    ) -> Vec<OutputChapter> {
        if boundaries.is_empty() {
            let title = document
                .metadata
                .title
                .clone()
                .unwrap_or_else(|| "Document".to_string());
            return vec![OutputChapter::new(0, title, document.plain_text())];
        }

        let mut sorted: Vec<&ChapterBoundary> = boundaries.iter().collect();
        sorted.sort_by_key(|b| b.page);

        let last_page = document.metadata.page_count.max(1);
        let mut chapters = Vec::with_capacity(sorted.len());

        for (i, boundary) in sorted.iter().enumerate() {
            let start = boundary.page;
            let end = match sorted.get(i + 1) {
                Some(next) => next.page.saturating_sub(1),
                None => last_page,
            };

            let mut pages = Vec::new();
            if end >= start {
                for page in start..=end {
                    let text = document.page_text(page);
                    if !text.trim().is_empty() {
                        pages.push(text);
                    }
                }
            }

            chapters.push(
                OutputChapter::new(i, boundary.title.clone(), pages.join("\n\n"))
                    .with_source_page(start)
                    .with_level(boundary.level),
            );
        }

        chapters
    }

    /// Navigation order: the explicit title order when configured and
    /// matching, otherwise chapter order.
    fn navigation_entries<'a>(&'a self, chapters: &'a [OutputChapter]) -> Vec<(&'a str, &'a str)> {
        if let Some(titles) = &self.options.toc_titles {
            let ordered: Vec<(&str, &str)> = titles
                .iter()
                .filter_map(|title| {
                    chapters
                        .iter()
                        .find(|c| &c.title == title)
                        .map(|c| (c.file_name.as_str(), c.title.as_str()))
                })
                .collect();
            if !ordered.is_empty() {
                return ordered;
            }
            log::warn!("custom TOC order matched no chapters, using chapter order");
        }

        chapters
            .iter()
            .map(|c| (c.file_name.as_str(), c.title.as_str()))
            .collect()
    }
}

impl Default for DocumentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick "zh" when the title or author carries CJK characters, otherwise
/// the configured default.
pub fn detect_language(title: &str, author: &str, default: &str) -> String {
    let has_cjk = title
        .chars()
        .chain(author.chars())
        .any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c));
    if has_cjk {
        "zh".to_string()
    } else {
        default.to_string()
    }
}

/// Match each image to a chapter, by explicit id list when the chapter
/// has one, otherwise by the chapter's page span.
fn assign_images<'a>(
    chapters: &[OutputChapter],
    images: &'a [ProcessedImage],
) -> Vec<Vec<&'a ProcessedImage>> {
    let mut assigned: Vec<Vec<&ProcessedImage>> = vec![Vec::new(); chapters.len()];

    for (i, chapter) in chapters.iter().enumerate() {
        if chapter.image_ids.is_empty() {
            continue;
        }
        for id in &chapter.image_ids {
            if let Some(image) = images.iter().find(|img| &img.id == id) {
                assigned[i].push(image);
            }
        }
    }

    let explicit: Vec<&String> = chapters.iter().flat_map(|c| &c.image_ids).collect();

    for image in images {
        if explicit.iter().any(|id| *id == &image.id) {
            continue;
        }
        if let Some(i) = chapter_for_page(chapters, image.page) {
            assigned[i].push(image);
        }
    }

    assigned
}

/// Media type from magic bytes. PNG covers both the \x89PNG signature
/// and the unrecognized default.
fn sniff_media_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xff, 0xd8]) {
        "image/jpeg"
    } else {
        "image/png"
    }
}

/// Index of the chapter whose page span contains `page`.
fn chapter_for_page(chapters: &[OutputChapter], page: u32) -> Option<usize> {
    let mut found = None;
    for (i, chapter) in chapters.iter().enumerate() {
        if chapter.source_page <= page {
            found = Some(i);
        } else {
            break;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DetectionMethod, ImageClass, ImageEncoding, QualityProfile, Rect, TextRun,
    };
    use std::io::Read;

    fn document_with_pages(pages: &[(u32, &str)]) -> ParsedDocument {
        let mut document = ParsedDocument::default();
        document.metadata.page_count = pages.iter().map(|(p, _)| *p).max().unwrap_or(0);
        for (i, (page, text)) in pages.iter().enumerate() {
            document.runs.push(TextRun::new(
                *text,
                Rect::new(72.0, 100.0, 400.0, 112.0),
                *page,
                i as u32,
            ));
        }
        document
    }

    fn boundary(page: u32, title: &str) -> ChapterBoundary {
        ChapterBoundary::new(page, title, 90.0, DetectionMethod::Outline)
    }

    fn png_image(id: &str, page: u32) -> ProcessedImage {
        ProcessedImage {
            id: id.into(),
            data: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3],
            original_encoding: "png".into(),
            encoding: ImageEncoding::Png,
            class: ImageClass::Diagrammatic,
            original_width: 10,
            original_height: 10,
            width: 10,
            height: 10,
            original_size: 11,
            processed_size: 11,
            compression_ratio: 1.0,
            page,
            bbox: Rect::new(0.0, 0.0, 10.0, 10.0),
            alt_text: None,
            associated_text: None,
            text_position: None,
            profile: QualityProfile::Standard,
        }
    }

    #[test]
    fn test_single_chapter_without_boundaries() {
        let document = document_with_pages(&[(1, "first page"), (2, "second page")]);
        let chapters = DocumentGenerator::new().chapters_from_runs(&document, &[]);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Document");
        assert!(chapters[0].content.contains("first page"));
        assert!(chapters[0].content.contains("second page"));
    }

    #[test]
    fn test_chapters_span_to_next_boundary() {
        let document = document_with_pages(&[
            (1, "intro text"),
            (2, "chapter one text"),
            (3, "more of one"),
            (4, "chapter two text"),
            (5, "tail"),
        ]);
        let boundaries = vec![boundary(2, "One"), boundary(4, "Two")];

        let chapters = DocumentGenerator::new().chapters_from_runs(&document, &boundaries);
        assert_eq!(chapters.len(), 2);

        assert_eq!(chapters[0].source_page, 2);
        assert!(chapters[0].content.contains("chapter one text"));
        assert!(chapters[0].content.contains("more of one"));
        assert!(!chapters[0].content.contains("chapter two"));

        assert!(chapters[1].content.contains("chapter two text"));
        assert!(chapters[1].content.contains("tail"));
    }

    #[test]
    fn test_boundaries_on_same_page_yield_empty_span() {
        let document = document_with_pages(&[(1, "page one"), (2, "page two")]);
        let boundaries = vec![boundary(2, "A"), boundary(2, "B")];

        let chapters = DocumentGenerator::new().chapters_from_runs(&document, &boundaries);
        assert_eq!(chapters.len(), 2);
        assert!(chapters[0].content.is_empty());
        assert!(chapters[1].content.contains("page two"));
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("测试标题", "", "en"), "zh");
        assert_eq!(detect_language("Plain Title", "王小波", "en"), "zh");
        assert_eq!(detect_language("Plain Title", "Jane Doe", "en"), "en");
        assert_eq!(detect_language("", "", "fr"), "fr");
    }

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(&[0x89, b'P', b'N', b'G']), "image/png");
        assert_eq!(sniff_media_type(&[0xff, 0xd8, 0xff, 0xe0]), "image/jpeg");
        assert_eq!(sniff_media_type(&[0x00, 0x01]), "image/png");
    }

    #[test]
    fn test_assign_images_by_page_span() {
        let chapters = vec![
            OutputChapter::new(0, "One", "").with_source_page(1),
            OutputChapter::new(1, "Two", "").with_source_page(5),
        ];
        let images = vec![png_image("p2_a", 2), png_image("p5_b", 5), png_image("p9_c", 9)];

        let assigned = assign_images(&chapters, &images);
        assert_eq!(assigned[0].len(), 1);
        assert_eq!(assigned[0][0].id, "p2_a");
        assert_eq!(assigned[1].len(), 2);
    }

    #[test]
    fn test_assign_images_respects_explicit_ids() {
        let mut first = OutputChapter::new(0, "One", "").with_source_page(1);
        first.image_ids = vec!["p9_c".to_string()];
        let chapters = vec![first, OutputChapter::new(1, "Two", "").with_source_page(5)];
        let images = vec![png_image("p9_c", 9)];

        let assigned = assign_images(&chapters, &images);
        assert_eq!(assigned[0].len(), 1);
        assert!(assigned[1].is_empty());
    }

    #[test]
    fn test_generate_writes_valid_container() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.epub");

        let chapters = vec![
            OutputChapter::new(0, "Intro & Start", "First paragraph.\n\nSecond <one>."),
            OutputChapter::new(1, "Body", "More text.").with_source_page(3),
        ];
        let mut metadata = OutputMetadata::new("Test Book", "Tester");
        metadata.record_provenance("conversion_method", "custom");
        let images = vec![png_image("p3_fig", 3)];

        DocumentGenerator::new()
            .generate(&output, &chapters, &metadata, &images)
            .unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();

        {
            let first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }

        let mut container = String::new();
        archive
            .by_name("META-INF/container.xml")
            .unwrap()
            .read_to_string(&mut container)
            .unwrap();
        assert!(container.contains("OEBPS/content.opf"));

        let mut opf = String::new();
        archive
            .by_name("OEBPS/content.opf")
            .unwrap()
            .read_to_string(&mut opf)
            .unwrap();
        assert!(opf.contains("<dc:title>Test Book</dc:title>"));
        assert!(opf.contains("chapter_002.xhtml"));
        assert!(opf.contains("images/p3_fig.png"));

        let mut chapter = String::new();
        archive
            .by_name("OEBPS/chapter_001.xhtml")
            .unwrap()
            .read_to_string(&mut chapter)
            .unwrap();
        assert!(chapter.contains("Intro &amp; Start"));
        assert!(chapter.contains("<p>Second &lt;one&gt;.</p>"));

        let mut second = String::new();
        archive
            .by_name("OEBPS/chapter_002.xhtml")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert!(second.contains("images/p3_fig.png"));

        assert!(archive.by_name("OEBPS/nav.xhtml").is_ok());
        assert!(archive.by_name("OEBPS/styles/stylesheet.css").is_ok());
        assert!(archive.by_name("OEBPS/images/p3_fig.png").is_ok());
    }

    #[test]
    fn test_generate_rejects_empty_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.epub");
        let metadata = OutputMetadata::new("T", "A");

        let result = DocumentGenerator::new().generate(&output, &[], &metadata, &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_toc_order() {
        let chapters = vec![
            OutputChapter::new(0, "Alpha", ""),
            OutputChapter::new(1, "Beta", ""),
        ];
        let generator = DocumentGenerator::with_options(
            EpubOptions::new().with_toc_order(vec!["Beta".into(), "Alpha".into()]),
        );

        let entries = generator.navigation_entries(&chapters);
        assert_eq!(entries[0].1, "Beta");
        assert_eq!(entries[1].1, "Alpha");
    }
}
