//! Conversion pipeline orchestration.
//!
//! Sequences the five custom stages (analysis, extraction, structure,
//! enhancement, generation), scores the result, and applies the fallback
//! policy. Stage failures are caught at stage boundaries; the caller only
//! ever sees the final [`ConversionResult`].

mod options;

pub use options::PipelineOptions;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use crate::chapter::ChapterDetector;
use crate::epub::{detect_language, DocumentGenerator};
use crate::error::Result;
use crate::fallback::{CalibreConverter, ComplexityHints};
use crate::image::{ImageOptions, ImageProcessor};
use crate::layout::LayoutAnalyzer;
use crate::model::{
    ChapterStructure, ConversionMethod, ConversionResult, DocumentMetadata, OutputChapter,
    OutputMetadata, ParsedDocument, PdfValidation, PipelineStage, TextRun,
};
use crate::ocr::OcrEngine;
use crate::oracle::Oracle;
use crate::parser::{validate, DocumentParser};

/// Quality score assigned to a successful external conversion.
const EXTERNAL_QUALITY_SCORE: f64 = 75.0;

/// Progress notification emitted at stage boundaries.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Stage name, or "done" for the terminal event.
    pub stage: String,

    /// Human-readable stage description.
    pub description: String,

    /// Overall completed fraction in [0, 1].
    pub fraction: f64,
}

type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// The five custom stages with their progress weights.
fn pipeline_stages() -> Vec<PipelineStage> {
    vec![
        PipelineStage::new("pdf_analysis", "Analyzing document structure", 0.1),
        PipelineStage::new("content_extraction", "Extracting text and images", 0.3),
        PipelineStage::new("structure_recognition", "Detecting chapters and layout", 0.2),
        PipelineStage::new("ai_enhancement", "Assembling chapters and metadata", 0.2),
        PipelineStage::new("epub_generation", "Packaging the output document", 0.2),
    ]
}

/// Overall conversion quality in [0, 100].
///
/// Additive: 50 base, +10 for known title and author, +15 for an outline,
/// + chapter confidence scaled by 0.2, +2 per image capped at 15, and a
/// text-extraction bonus from the scan probability bands.
pub fn quality_score(
    metadata: &DocumentMetadata,
    structure: &ChapterStructure,
    image_count: usize,
) -> f64 {
    let mut score = 50.0;

    if metadata.has_title_and_author() {
        score += 10.0;
    }
    if metadata.has_outline {
        score += 15.0;
    }

    score += structure.confidence * 0.2;

    if image_count > 0 {
        score += (image_count as f64 * 2.0).min(15.0);
    }

    if metadata.scan_probability < 0.3 {
        score += 10.0;
    } else if metadata.scan_probability < 0.7 {
        score += 5.0;
    }

    score.clamp(0.0, 100.0)
}

/// Five-stage conversion pipeline with external-converter fallback.
///
/// # Example
///
/// ```no_run
/// use bookforge::pipeline::{ConversionPipeline, PipelineOptions};
/// use std::path::Path;
///
/// let pipeline = ConversionPipeline::new();
/// let result = pipeline.convert(Path::new("book.pdf"), Path::new("book.epub"));
/// println!("{} (quality {:.0})", result.method, result.quality_score);
/// ```
pub struct ConversionPipeline {
    options: PipelineOptions,
    layout_analyzer: LayoutAnalyzer,
    chapter_detector: ChapterDetector,
    image_processor: ImageProcessor,
    generator: DocumentGenerator,
    fallback: CalibreConverter,
    oracle: Option<Box<dyn Oracle>>,
    progress: Option<ProgressCallback>,
}

impl ConversionPipeline {
    pub fn new() -> Self {
        Self::with_options(PipelineOptions::default())
    }

    pub fn with_options(options: PipelineOptions) -> Self {
        let image_options = ImageOptions::new()
            .with_profile(options.profile)
            .with_alt_text(options.alt_text);

        Self {
            layout_analyzer: LayoutAnalyzer::new(),
            chapter_detector: ChapterDetector::new(),
            image_processor: ImageProcessor::with_options(image_options),
            generator: DocumentGenerator::with_options(options.epub.clone()),
            fallback: CalibreConverter::with_options(options.fallback.clone()),
            oracle: None,
            progress: None,
            options,
        }
    }

    /// Attach an oracle consulted for chapter detection and alt text.
    pub fn with_oracle(mut self, oracle: Box<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Attach a progress callback fired at stage boundaries.
    pub fn with_progress(
        mut self,
        callback: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Convert one document.
    ///
    /// All failures fold into the returned result; the fallback runs when
    /// the source is unsuitable for the custom path, a required stage
    /// fails, or the quality score misses the threshold. A working custom
    /// result is kept when the fallback fails too.
    pub fn convert(&self, input: &Path, output: &Path) -> ConversionResult {
        let started = Instant::now();
        log::info!("converting {} -> {}", input.display(), output.display());

        let validation = validate(input);
        if let Some(reason) = entry_reason(&validation, self.options.force_external) {
            log::info!("skipping custom pipeline: {reason}");
            return self.run_fallback(input, output, &reason, started);
        }

        let custom = self.run_custom(input, output, started);

        let hints = ComplexityHints::default();
        let Some(reason) =
            self.fallback
                .should_fallback(custom.quality_score, !custom.success, false, &hints)
        else {
            return custom;
        };

        log::info!("invoking external converter: {reason}");
        let external = self.run_fallback(input, output, &reason, started);

        if external.success {
            external
        } else if custom.success {
            log::warn!("external converter failed, keeping custom result");
            custom
        } else {
            let custom_error = custom.error.as_deref().unwrap_or("unknown").to_string();
            let external_error = external.error.as_deref().unwrap_or("unknown").to_string();
            let mut result = ConversionResult::failed(
                format!(
                    "custom pipeline failed ({custom_error}); external converter failed ({external_error})"
                ),
                started.elapsed(),
            );
            result.stages_completed = custom.stages_completed;
            result
        }
    }

    fn run_custom(&self, input: &Path, output: &Path, started: Instant) -> ConversionResult {
        let mut stages = pipeline_stages();

        // Stage 1: parse the document.
        let Some(document) = self.run_stage(&mut stages, 0, || {
            let parser = DocumentParser::open_with_options(input, self.options.parser.clone())?;
            parser.parse()
        }) else {
            return failure_from_stages(&stages, started);
        };
        log::info!(
            "analysis: {} pages, {} runs, {} images, scan probability {:.2}",
            document.metadata.page_count,
            document.runs.len(),
            document.images.len(),
            document.metadata.scan_probability
        );

        // Stage 2: working text (with OCR when extraction is thin) and images.
        let Some((working_text, processed_images, ocr_applied)) =
            self.run_stage(&mut stages, 1, || {
                let mut working_text = document.plain_text();
                let mut ocr_applied = false;

                let avg = document.avg_chars_per_page();
                if document.metadata.page_count > 0
                    && avg < self.options.ocr_trigger_chars_per_page
                {
                    log::info!("low text density ({avg:.0} chars/page), attempting recognition");
                    if let Some(recognized) = self.run_ocr(input, &document) {
                        ocr_applied = merge_recognized(&mut working_text, recognized);
                        if ocr_applied {
                            log::info!("using recognized text, longer than extracted text");
                        }
                    }
                }

                let processed =
                    self.image_processor
                        .process(&document.images, &document.runs, self.oracle_ref());
                Ok((working_text, processed, ocr_applied))
            })
        else {
            return failure_from_stages(&stages, started);
        };

        // Stage 3: page layouts and chapter boundaries.
        let Some((structure, multi_column_pages, table_count)) =
            self.run_stage(&mut stages, 2, || {
                // One page at a time so layout buffers drop before the next page.
                let mut multi_column_pages = 0u32;
                let mut table_count = 0usize;
                for page in 1..=document.metadata.page_count {
                    let page_runs: Vec<TextRun> = document
                        .runs
                        .iter()
                        .filter(|r| r.page == page)
                        .cloned()
                        .collect();
                    let layout = self.layout_analyzer.analyze(page, &page_runs);
                    if layout.is_multi_column() {
                        multi_column_pages += 1;
                    }
                    table_count += layout.tables.len();
                }

                let structure = self.chapter_detector.detect(&document, self.oracle_ref());
                Ok((structure, multi_column_pages, table_count))
            })
        else {
            return failure_from_stages(&stages, started);
        };

        // Stage 4: output metadata and chapter assembly.
        let Some((output_metadata, chapters)) = self.run_stage(&mut stages, 3, || {
            let mut metadata = self.build_output_metadata(&document);
            metadata.record_provenance("conversion_method", ConversionMethod::Custom.to_string());
            metadata.record_provenance("source_pages", document.metadata.page_count.to_string());

            let chapters = if structure.boundaries.is_empty() {
                // No boundaries: one chapter holding the working text, so a
                // recognized-text replacement is not lost.
                let title = document
                    .metadata
                    .title
                    .clone()
                    .unwrap_or_else(|| "Document".to_string());
                vec![OutputChapter::new(0, title, working_text.clone())]
            } else {
                self.generator.chapters_from_runs(&document, &structure.boundaries)
            };
            Ok((metadata, chapters))
        }) else {
            return failure_from_stages(&stages, started);
        };

        // Stage 5: package the output.
        if self
            .run_stage(&mut stages, 4, || {
                self.generator
                    .generate(output, &chapters, &output_metadata, &processed_images)
            })
            .is_none()
        {
            return failure_from_stages(&stages, started);
        }

        let score = quality_score(&document.metadata, &structure, processed_images.len());
        self.emit(ProgressEvent {
            stage: "done".to_string(),
            description: "Conversion complete".to_string(),
            fraction: 1.0,
        });
        log::info!(
            "custom conversion finished: quality {score:.1}, {} chapters, {} images",
            structure.chapter_count(),
            processed_images.len()
        );

        let mut metadata = BTreeMap::new();
        metadata.insert("profile".to_string(), self.options.profile.to_string());
        metadata.insert(
            "pages".to_string(),
            document.metadata.page_count.to_string(),
        );
        metadata.insert("chapters".to_string(), structure.chapter_count().to_string());
        metadata.insert("images".to_string(), processed_images.len().to_string());
        metadata.insert(
            "chapter_confidence".to_string(),
            format!("{:.1}", structure.confidence),
        );
        metadata.insert(
            "chapter_methods".to_string(),
            structure
                .methods_used
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );
        metadata.insert(
            "scan_probability".to_string(),
            format!("{:.2}", document.metadata.scan_probability),
        );
        metadata.insert("ocr_applied".to_string(), ocr_applied.to_string());
        metadata.insert(
            "multi_column_pages".to_string(),
            multi_column_pages.to_string(),
        );
        metadata.insert("tables_detected".to_string(), table_count.to_string());

        ConversionResult {
            success: true,
            output_path: Some(output.to_path_buf()),
            error: None,
            duration: started.elapsed(),
            quality_score: score,
            method: ConversionMethod::Custom,
            stages_completed: completed_names(&stages),
            metadata,
        }
    }

    /// Run one stage body, recording duration and catching its error.
    fn run_stage<T>(
        &self,
        stages: &mut [PipelineStage],
        index: usize,
        body: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        let fraction: f64 = stages[..index].iter().map(|s| s.weight).sum();
        self.emit(ProgressEvent {
            stage: stages[index].name.clone(),
            description: stages[index].description.clone(),
            fraction,
        });

        let stage_started = Instant::now();
        let outcome = body();
        let stage = &mut stages[index];
        stage.duration = stage_started.elapsed();

        match outcome {
            Ok(value) => {
                stage.completed = true;
                log::debug!(
                    "stage {} completed in {:.2}s",
                    stage.name,
                    stage.duration.as_secs_f64()
                );
                Some(value)
            }
            Err(e) => {
                log::error!("stage {} failed: {e}", stage.name);
                stage.error = Some(e.to_string());
                None
            }
        }
    }

    fn run_ocr(&self, input: &Path, document: &ParsedDocument) -> Option<String> {
        let engine = match OcrEngine::with_options(self.options.ocr.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                log::warn!("recognition unavailable: {e}");
                return None;
            }
        };

        let pages: Vec<u32> = (1..=document.metadata.page_count).collect();
        match engine.recognize_document(input, &pages) {
            Ok(results) => {
                let text = results
                    .iter()
                    .map(|r| r.result.text.as_str())
                    .filter(|t| !t.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some(text)
            }
            Err(e) => {
                log::warn!("recognition failed: {e}");
                None
            }
        }
    }

    fn build_output_metadata(&self, document: &ParsedDocument) -> OutputMetadata {
        let meta = &document.metadata;
        let title = meta
            .title
            .clone()
            .unwrap_or_else(|| "Unknown Title".to_string());
        let author = meta
            .author
            .clone()
            .unwrap_or_else(|| "Unknown Author".to_string());
        let language = detect_language(&title, &author, &self.options.epub.default_language);
        let description = meta
            .subject
            .clone()
            .unwrap_or_else(|| "Converted from PDF".to_string());

        OutputMetadata::new(title, author)
            .with_language(language)
            .with_description(description)
    }

    fn run_fallback(
        &self,
        input: &Path,
        output: &Path,
        reason: &str,
        started: Instant,
    ) -> ConversionResult {
        if !self.fallback.is_available() {
            return ConversionResult::failed(
                format!("external converter unavailable ({reason})"),
                started.elapsed(),
            );
        }

        self.emit(ProgressEvent {
            stage: "external_conversion".to_string(),
            description: "Converting with the external tool".to_string(),
            fraction: 0.0,
        });

        let run = self.fallback.convert(input, output);
        if !run.success {
            return ConversionResult::failed(
                format!(
                    "external conversion failed: {}",
                    run.error.as_deref().unwrap_or("unknown error")
                ),
                started.elapsed(),
            );
        }

        self.emit(ProgressEvent {
            stage: "done".to_string(),
            description: "Conversion complete".to_string(),
            fraction: 1.0,
        });

        let mut metadata = BTreeMap::new();
        metadata.insert("fallback_reason".to_string(), reason.to_string());
        metadata.insert("output_size".to_string(), run.output_size.to_string());
        metadata.insert(
            "external_duration".to_string(),
            format!("{:.1}", run.duration.as_secs_f64()),
        );
        metadata.insert(
            "pages_reported".to_string(),
            run.indicators.pages_processed.to_string(),
        );
        metadata.insert(
            "images_reported".to_string(),
            run.indicators.images_extracted.to_string(),
        );
        metadata.insert(
            "toc_generated".to_string(),
            run.indicators.toc_generated.to_string(),
        );
        metadata.insert(
            "warnings".to_string(),
            run.indicators.warnings_count.to_string(),
        );

        ConversionResult {
            success: true,
            output_path: run.output_path,
            error: None,
            duration: started.elapsed(),
            quality_score: EXTERNAL_QUALITY_SCORE,
            method: ConversionMethod::External,
            stages_completed: vec!["external_conversion".to_string()],
            metadata,
        }
    }

    fn oracle_ref(&self) -> Option<&dyn Oracle> {
        self.oracle.as_deref()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Reason to skip the custom path entirely, when one exists.
fn entry_reason(validation: &PdfValidation, force_external: bool) -> Option<String> {
    if force_external {
        return Some("external conversion requested".to_string());
    }
    if validation.is_encrypted {
        return Some("document is encrypted".to_string());
    }
    if !validation.is_valid {
        return Some(
            validation
                .error
                .clone()
                .unwrap_or_else(|| "document failed validation".to_string()),
        );
    }
    None
}

/// Replace the working text when the recognized text is longer.
fn merge_recognized(working: &mut String, recognized: String) -> bool {
    if recognized.chars().count() > working.chars().count() {
        *working = recognized;
        true
    } else {
        false
    }
}

fn completed_names(stages: &[PipelineStage]) -> Vec<String> {
    stages
        .iter()
        .filter(|s| s.completed)
        .map(|s| s.name.clone())
        .collect()
}

fn failure_from_stages(stages: &[PipelineStage], started: Instant) -> ConversionResult {
    let detail = stages
        .iter()
        .find_map(|s| s.error.as_ref().map(|e| format!("{} failed: {e}", s.name)))
        .unwrap_or_else(|| "pipeline failed".to_string());

    let mut result = ConversionResult::failed(detail, started.elapsed());
    result.stages_completed = completed_names(stages);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(
        title: Option<&str>,
        author: Option<&str>,
        has_outline: bool,
        scan_probability: f64,
    ) -> DocumentMetadata {
        DocumentMetadata {
            title: title.map(String::from),
            author: author.map(String::from),
            has_outline,
            scan_probability,
            page_count: 10,
            ..Default::default()
        }
    }

    fn structure_with_confidence(confidence: f64) -> ChapterStructure {
        ChapterStructure {
            confidence,
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_weights_sum_to_one() {
        let stages = pipeline_stages();
        assert_eq!(stages.len(), 5);
        let total: f64 = stages.iter().map(|s| s.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "pdf_analysis",
                "content_extraction",
                "structure_recognition",
                "ai_enhancement",
                "epub_generation"
            ]
        );
    }

    #[test]
    fn test_quality_score_base() {
        let score = quality_score(
            &metadata(None, None, false, 0.9),
            &structure_with_confidence(0.0),
            0,
        );
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_quality_score_full_featured() {
        // 50 + 10 (title/author) + 15 (outline) + 90*0.2 (chapters)
        // + 10 (5 images) + 10 (clean text) = 103, clamped to 100.
        let score = quality_score(
            &metadata(Some("Title"), Some("Author"), true, 0.1),
            &structure_with_confidence(90.0),
            5,
        );
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_quality_score_component_sums() {
        let score = quality_score(
            &metadata(Some("T"), Some("A"), false, 0.5),
            &structure_with_confidence(50.0),
            2,
        );
        // 50 + 10 + 50*0.2 + 4 + 5 = 79
        assert!((score - 79.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_image_bonus_caps_at_15() {
        let few = quality_score(
            &metadata(None, None, false, 0.9),
            &structure_with_confidence(0.0),
            3,
        );
        assert_eq!(few, 56.0);

        let many = quality_score(
            &metadata(None, None, false, 0.9),
            &structure_with_confidence(0.0),
            200,
        );
        assert_eq!(many, 65.0);
    }

    #[test]
    fn test_quality_score_always_clamped() {
        for &(outline, scan, confidence, images) in &[
            (true, 0.0, 100.0, 500),
            (false, 1.0, 0.0, 0),
            (true, 0.5, 73.5, 7),
        ] {
            let score = quality_score(
                &metadata(Some("T"), Some("A"), outline, scan),
                &structure_with_confidence(confidence),
                images,
            );
            assert!((0.0..=100.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn test_entry_reason_forced() {
        let validation = PdfValidation {
            is_valid: true,
            ..Default::default()
        };
        let reason = entry_reason(&validation, true).unwrap();
        assert!(reason.contains("requested"));
    }

    #[test]
    fn test_entry_reason_encrypted_skips_custom_path() {
        let validation = PdfValidation {
            is_valid: true,
            is_encrypted: true,
            ..Default::default()
        };
        let reason = entry_reason(&validation, false).unwrap();
        assert!(reason.contains("encrypted"));
    }

    #[test]
    fn test_entry_reason_invalid() {
        let validation = PdfValidation {
            is_valid: false,
            error: Some("missing %PDF header".to_string()),
            ..Default::default()
        };
        let reason = entry_reason(&validation, false).unwrap();
        assert!(reason.contains("%PDF"));
    }

    #[test]
    fn test_entry_reason_accepts_clean_document() {
        let validation = PdfValidation {
            is_valid: true,
            ..Default::default()
        };
        assert!(entry_reason(&validation, false).is_none());
    }

    #[test]
    fn test_merge_recognized_prefers_longer_text() {
        let mut working = "short".to_string();
        assert!(merge_recognized(&mut working, "a much longer recognized text".to_string()));
        assert_eq!(working, "a much longer recognized text");

        let mut working = "already a reasonably long extraction".to_string();
        assert!(!merge_recognized(&mut working, "tiny".to_string()));
        assert_eq!(working, "already a reasonably long extraction");
    }

    #[test]
    fn test_failure_from_stages_reports_first_error() {
        let mut stages = pipeline_stages();
        stages[0].completed = true;
        stages[1].error = Some("decode error".to_string());

        let result = failure_from_stages(&stages, Instant::now());
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("content_extraction failed: decode error"));
        assert_eq!(result.stages_completed, vec!["pdf_analysis".to_string()]);
    }
}
