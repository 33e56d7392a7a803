//! Markup and package-document serialization.
//!
//! All XML written into the container comes from this module so the
//! byte layout stays deterministic for identical inputs.

use crate::model::{OutputChapter, OutputMetadata, ProcessedImage};

/// Stylesheet tuned for CJK body text.
pub(crate) const CJK_STYLESHEET: &str = r#"body {
  font-family: "Noto Sans CJK SC", "PingFang SC", "Microsoft YaHei", sans-serif;
  line-height: 1.8;
  margin: 1em;
  text-align: justify;
}

.chapter-title {
  font-size: 1.5em;
  font-weight: bold;
  text-align: center;
  margin: 2em 0 1.5em 0;
}

.chapter-content {
  max-width: 100%;
  margin: 0 auto;
}

p {
  text-indent: 2em;
  margin-bottom: 1em;
  line-height: 1.8;
  text-align: justify;
}

img {
  max-width: 100%;
  height: auto;
  display: block;
  margin: 1em auto;
}
"#;

/// Stylesheet for Latin-script body text.
pub(crate) const LATIN_STYLESHEET: &str = r#"body {
  font-family: "Georgia", "Times New Roman", serif;
  line-height: 1.6;
  margin: 1em;
  text-align: justify;
}

.chapter-title {
  font-size: 1.5em;
  font-weight: bold;
  text-align: center;
  margin: 2em 0 1.5em 0;
}

.chapter-content {
  max-width: 100%;
  margin: 0 auto;
}

p {
  margin-bottom: 1em;
  line-height: 1.6;
  text-align: justify;
}

img {
  max-width: 100%;
  height: auto;
  display: block;
  margin: 1em auto;
}
"#;

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Escape text for inclusion in XML content or attributes.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one chapter as an XHTML document.
///
/// Paragraphs come from blank-line splits; the chapter's images follow
/// the text in page order.
pub(crate) fn chapter_document(chapter: &OutputChapter, images: &[&ProcessedImage]) -> String {
    let title = escape(&chapter.title);

    let mut body = String::new();
    for paragraph in chapter.content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        body.push_str("      <p>");
        body.push_str(&escape(paragraph));
        body.push_str("</p>\n");
    }

    for image in images {
        let alt = image.alt_text.as_deref().unwrap_or("");
        body.push_str(&format!(
            "      <img src=\"images/{}\" alt=\"{}\"/>\n",
            image.file_name(),
            escape(alt)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{title}</title>
  <meta charset="utf-8"/>
  <link rel="stylesheet" type="text/css" href="styles/stylesheet.css"/>
</head>
<body>
  <div class="chapter">
    <h1 class="chapter-title">{title}</h1>
    <div class="chapter-content">
{body}    </div>
  </div>
</body>
</html>
"#
    )
}

/// Manifest entry for an image resource.
pub(crate) struct ImageManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: &'static str,
}

/// Render the OPF package document.
pub(crate) fn content_opf(
    metadata: &OutputMetadata,
    chapters: &[OutputChapter],
    images: &[ImageManifestEntry],
) -> String {
    let mut dc = String::new();
    dc.push_str(&format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n",
        escape(&metadata.identifier)
    ));
    dc.push_str(&format!("    <dc:title>{}</dc:title>\n", escape(&metadata.title)));
    dc.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        escape(&metadata.author)
    ));
    dc.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        escape(&metadata.language)
    ));
    dc.push_str(&format!(
        "    <dc:publisher>{}</dc:publisher>\n",
        escape(&metadata.publisher)
    ));
    if !metadata.description.is_empty() {
        dc.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            escape(&metadata.description)
        ));
    }
    for tag in &metadata.tags {
        dc.push_str(&format!("    <dc:subject>{}</dc:subject>\n", escape(tag)));
    }
    dc.push_str(&format!(
        "    <dc:date>{}</dc:date>\n",
        metadata.created.format("%Y-%m-%d")
    ));
    dc.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        metadata.modified.format("%Y-%m-%dT%H:%M:%SZ")
    ));
    for (key, value) in &metadata.provenance {
        dc.push_str(&format!(
            "    <meta name=\"bookforge:{}\" content=\"{}\"/>\n",
            escape(key),
            escape(value)
        ));
    }

    let mut manifest = String::new();
    manifest.push_str(
        "    <item id=\"style\" href=\"styles/stylesheet.css\" media-type=\"text/css\"/>\n",
    );
    manifest.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    for chapter in chapters {
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            chapter.id, chapter.file_name
        ));
    }
    for image in images {
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            escape(&image.id),
            escape(&image.href),
            image.media_type
        ));
    }

    let mut spine = String::new();
    spine.push_str("    <itemref idref=\"nav\"/>\n");
    for chapter in chapters {
        spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", chapter.id));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{dc}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#
    )
}

/// Render the EPUB 3 navigation document.
pub(crate) fn nav_xhtml(book_title: &str, entries: &[(&str, &str)]) -> String {
    let mut items = String::new();
    for (file_name, title) in entries {
        items.push_str(&format!(
            "        <li><a href=\"{}\">{}</a></li>\n",
            file_name,
            escape(title)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <title>{}</title>
  <meta charset="utf-8"/>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
{}    </ol>
  </nav>
</body>
</html>
"#,
        escape(book_title),
        items
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_all_special_characters() {
        assert_eq!(
            escape(r#"Tom & Jerry's <"Adventure">"#),
            "Tom &amp; Jerry&#39;s &lt;&quot;Adventure&quot;&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_chapter_document_paragraphs() {
        let chapter = OutputChapter::new(0, "First & Last", "One.\n\nTwo.\n\n\n\nThree.");
        let doc = chapter_document(&chapter, &[]);

        assert!(doc.contains("<h1 class=\"chapter-title\">First &amp; Last</h1>"));
        assert_eq!(doc.matches("<p>").count(), 3);
        assert!(doc.contains("<p>One.</p>"));
        assert!(doc.contains("<p>Three.</p>"));
    }

    #[test]
    fn test_chapter_document_is_wellformed_shell() {
        let chapter = OutputChapter::new(0, "T", "body");
        let doc = chapter_document(&chapter, &[]);
        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains("xmlns=\"http://www.w3.org/1999/xhtml\""));
        assert!(doc.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_nav_lists_entries_in_order() {
        let nav = nav_xhtml(
            "Book",
            &[
                ("chapter_001.xhtml", "Intro"),
                ("chapter_002.xhtml", "Body & Soul"),
            ],
        );
        let intro = nav.find("chapter_001.xhtml").unwrap();
        let body = nav.find("chapter_002.xhtml").unwrap();
        assert!(intro < body);
        assert!(nav.contains("Body &amp; Soul"));
    }

    #[test]
    fn test_content_opf_structure() {
        let mut metadata = OutputMetadata::new("Title", "Author");
        metadata.record_provenance("conversion_method", "custom");
        let chapters = vec![OutputChapter::new(0, "One", "text")];
        let images = vec![ImageManifestEntry {
            id: "p1_im0".into(),
            href: "images/p1_im0.png".into(),
            media_type: "image/png",
        }];

        let opf = content_opf(&metadata, &chapters, &images);
        assert!(opf.contains("unique-identifier=\"book-id\""));
        assert!(opf.contains("<dc:identifier id=\"book-id\">urn:uuid:"));
        assert!(opf.contains("properties=\"nav\""));
        assert!(opf.contains("<item id=\"chapter_001\" href=\"chapter_001.xhtml\""));
        assert!(opf.contains("media-type=\"image/png\""));
        assert!(opf.contains("bookforge:conversion_method"));
        assert!(opf.contains("<itemref idref=\"nav\"/>"));

        let nav_ref = opf.find("<itemref idref=\"nav\"/>").unwrap();
        let chapter_ref = opf.find("<itemref idref=\"chapter_001\"/>").unwrap();
        assert!(nav_ref < chapter_ref);
    }
}
