//! Optical character recognition through the `tesseract` CLI.
//!
//! Recognition runs as a subprocess using TSV output for per-word
//! confidence. Availability is probed once at engine construction so a
//! missing binary surfaces as a single clear error instead of one
//! failure per page.

mod preprocess;

pub use preprocess::preprocess;

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::exec::{probe_tool, run_with_timeout};
use crate::model::{OcrResult, OcrWord, PageOcrResult, RenderedPage, ScriptTag};
use crate::parser::PageRenderer;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const RECOGNIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// CJK ideograph count in the constrained pass above which the page is
/// treated as Chinese text.
const CJK_CHAR_TRIGGER: usize = 10;

/// Options controlling recognition.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Mean word confidence below which a warning is recorded. Default: 60.0.
    pub confidence_threshold: f64,

    /// Render resolution for document recognition. Default: 300.
    pub dpi: u32,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 60.0,
            dpi: 300,
        }
    }
}

impl OcrOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

/// Tesseract-backed OCR engine.
///
/// # Example
///
/// ```no_run
/// use bookforge::ocr::OcrEngine;
///
/// # fn main() -> bookforge::Result<()> {
/// let engine = OcrEngine::new()?;
/// println!("engine: {}", engine.version());
/// # Ok(())
/// # }
/// ```
pub struct OcrEngine {
    version: String,
    options: OcrOptions,
}

impl OcrEngine {
    pub fn new() -> Result<Self> {
        Self::with_options(OcrOptions::default())
    }

    pub fn with_options(options: OcrOptions) -> Result<Self> {
        let version = probe_tool("tesseract", &["--version"], PROBE_TIMEOUT).ok_or_else(|| {
            Error::ExternalToolUnavailable {
                tool: "tesseract".to_string(),
            }
        })?;
        log::debug!("ocr engine: {version}");
        Ok(Self { version, options })
    }

    /// Version line reported by the tool.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Recognize one rendered page.
    ///
    /// Preprocesses the image, picks a recognition script, then runs the
    /// full pass. Low mean confidence is recorded as a warning, never an
    /// error.
    pub fn recognize(&self, rendered: &RenderedPage) -> Result<PageOcrResult> {
        let mut warnings = Vec::new();

        let prepared = preprocess(&rendered.image);

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("page.png");
        prepared
            .save(&input)
            .map_err(|e| Error::ImageProcessing(e.to_string()))?;

        let script = match self.detect_script(&input, dir.path()) {
            Ok(script) => script,
            Err(e) => {
                log::debug!("script detection failed ({e}), defaulting to Latin");
                warnings.push("script detection failed, assuming Latin text".to_string());
                ScriptTag::Latin
            }
        };

        let result = self.full_pass(&input, dir.path(), script)?;

        if result.confidence < self.options.confidence_threshold {
            warnings.push(format!(
                "low recognition confidence: {:.1} (threshold {:.1})",
                result.confidence, self.options.confidence_threshold
            ));
        }

        Ok(PageOcrResult {
            page: rendered.page,
            result,
            dpi: rendered.dpi,
            warnings,
        })
    }

    /// Render and recognize a set of pages, one at a time.
    ///
    /// Pages that fail to render or recognize yield an empty result with
    /// a warning instead of aborting the whole document.
    pub fn recognize_document(
        &self,
        pdf: &Path,
        pages: &[u32],
    ) -> Result<Vec<PageOcrResult>> {
        let renderer = PageRenderer::new()?;
        let mut results = Vec::with_capacity(pages.len());

        for &page in pages {
            let outcome = renderer
                .render_page(pdf, page, self.options.dpi)
                .and_then(|rendered| self.recognize(&rendered));

            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    log::warn!("ocr failed on page {page}: {e}");
                    results.push(PageOcrResult {
                        page,
                        result: OcrResult::default(),
                        dpi: self.options.dpi,
                        warnings: vec![format!("recognition failed: {e}")],
                    });
                }
            }
        }

        Ok(results)
    }

    /// Constrained Chinese pass: enough CJK ideographs in the output
    /// switch the full pass to the combined Chinese models.
    fn detect_script(&self, input: &Path, work_dir: &Path) -> Result<ScriptTag> {
        let out_base = work_dir.join("script_probe");
        self.run_tesseract(input, &out_base, "chi_sim", &[])?;

        let text = std::fs::read_to_string(out_base.with_extension("txt")).unwrap_or_default();
        let cjk_chars = text
            .chars()
            .filter(|c| ('\u{4E00}'..='\u{9FFF}').contains(c))
            .count();

        if cjk_chars > CJK_CHAR_TRIGGER {
            log::debug!("detected CJK text ({cjk_chars} ideographs)");
            Ok(ScriptTag::Cjk)
        } else {
            Ok(ScriptTag::Latin)
        }
    }

    fn full_pass(&self, input: &Path, work_dir: &Path, script: ScriptTag) -> Result<OcrResult> {
        let out_base = work_dir.join("recognized");
        self.run_tesseract(input, &out_base, script.model_tags(), &["tsv"])?;

        let tsv = std::fs::read_to_string(out_base.with_extension("tsv"))?;
        let rows = parse_tsv(&tsv);
        let text = assemble_text(&rows);
        let words: Vec<OcrWord> = rows.into_iter().map(|r| r.word).collect();
        let confidence = OcrResult::mean_confidence(&words);

        Ok(OcrResult {
            text,
            confidence,
            script,
            words,
        })
    }

    fn run_tesseract(
        &self,
        input: &Path,
        out_base: &Path,
        lang: &str,
        configs: &[&str],
    ) -> Result<()> {
        let mut command = Command::new("tesseract");
        command.arg(input).arg(out_base).arg("-l").arg(lang);
        for config in configs {
            command.arg(config);
        }

        let output = run_with_timeout(command, RECOGNIZE_TIMEOUT)?;
        if !output.success {
            return Err(Error::ExternalToolError {
                tool: "tesseract".to_string(),
                message: output
                    .stderr
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("recognition failed")
                    .trim()
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// One word row from tesseract TSV output, with its line coordinates.
#[derive(Debug)]
struct TsvRow {
    block: u32,
    paragraph: u32,
    line: u32,
    word: OcrWord,
}

/// Parse tesseract TSV output, keeping word-level rows (level 5) with a
/// real confidence value.
fn parse_tsv(tsv: &str) -> Vec<TsvRow> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let confidence: f64 = cols[10].parse().ok()?;
            if confidence < 0.0 {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(TsvRow {
                block: cols[2].parse().ok()?,
                paragraph: cols[3].parse().ok()?,
                line: cols[4].parse().ok()?,
                word: OcrWord {
                    text: text.to_string(),
                    confidence,
                },
            })
        })
        .collect()
}

/// Join words with spaces, starting a new output line whenever the
/// (block, paragraph, line) key changes.
fn assemble_text(rows: &[TsvRow]) -> String {
    let mut text = String::new();
    let mut current_key: Option<(u32, u32, u32)> = None;

    for row in rows {
        let key = (row.block, row.paragraph, row.line);
        match current_key {
            None => {}
            Some(prev) if prev == key => text.push(' '),
            Some(_) => text.push('\n'),
        }
        text.push_str(&row.word.text);
        current_key = Some(key);
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: u32, line: u32, word: u32, conf: f64, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{word}\t10\t10\t50\t20\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let tsv = format!(
            "{HEADER}\n4\t1\t1\t1\t1\t0\t0\t0\t100\t30\t-1\t\n{}\n{}",
            word_row(1, 1, 1, 91.0, "Hello"),
            word_row(1, 1, 2, 85.5, "world")
        );
        let rows = parse_tsv(&tsv);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].word.text, "Hello");
        assert_eq!(rows[1].word.confidence, 85.5);
    }

    #[test]
    fn test_parse_tsv_skips_negative_confidence() {
        let tsv = format!("{HEADER}\n{}", word_row(1, 1, 1, -1.0, "ghost"));
        assert!(parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn test_assemble_text_line_breaks() {
        let tsv = format!(
            "{HEADER}\n{}\n{}\n{}",
            word_row(1, 1, 1, 90.0, "First"),
            word_row(1, 1, 2, 90.0, "line"),
            word_row(1, 2, 1, 90.0, "Second")
        );
        let rows = parse_tsv(&tsv);
        assert_eq!(assemble_text(&rows), "First line\nSecond");
    }

    #[test]
    fn test_assemble_text_empty() {
        assert_eq!(assemble_text(&[]), "");
    }

    #[test]
    fn test_options_builder() {
        let options = OcrOptions::new().with_confidence_threshold(75.0).with_dpi(200);
        assert_eq!(options.confidence_threshold, 75.0);
        assert_eq!(options.dpi, 200);
    }
}
