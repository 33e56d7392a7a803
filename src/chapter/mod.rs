//! Multi-method chapter boundary detection and reconciliation.
//!
//! Four detectors run independently (document outline, font geometry,
//! page-start patterns, optional oracle) and are merged by fixed
//! priority. Detection never fails: degraded input yields an empty
//! structure with diagnostics instead of an error.

mod detectors;
mod heuristics;

pub use heuristics::{titles_similar, HeadingFilter, TitleCleaner};

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ChapterBoundary, ChapterStructure, DetectionMethod, ParsedDocument};
use crate::oracle::Oracle;

/// Title similarity at or above which two candidates conflict.
const CONFLICT_SIMILARITY: f64 = 0.8;

/// Title similarity at or above which a later boundary is a duplicate.
const DUPLICATE_SIMILARITY: f64 = 0.9;

/// Page distance within which similar titles conflict.
const CONFLICT_PAGE_DISTANCE: u32 = 2;

/// Detects and reconciles chapter boundaries.
///
/// # Example
///
/// ```
/// use bookforge::chapter::ChapterDetector;
/// use bookforge::model::ParsedDocument;
///
/// let document = ParsedDocument::default();
/// let structure = ChapterDetector::new().detect(&document, None);
/// assert_eq!(structure.chapter_count(), 0);
/// ```
pub struct ChapterDetector {
    filter: HeadingFilter,
    cleaner: TitleCleaner,
    oracle_line: regex::Regex,
}

impl ChapterDetector {
    pub fn new() -> Self {
        Self {
            filter: HeadingFilter::new(),
            cleaner: TitleCleaner::new(),
            oracle_line: detectors::oracle_line_pattern(),
        }
    }

    /// Run all detectors over the parsed document and merge the results.
    pub fn detect(
        &self,
        document: &ParsedDocument,
        oracle: Option<&dyn Oracle>,
    ) -> ChapterStructure {
        if document.runs.is_empty() && document.outline.is_empty() {
            return ChapterStructure::empty("no text or outline to analyze");
        }

        let mut notes = Vec::new();

        let outline = detectors::detect_from_outline(&document.outline, &self.filter);
        let font = detectors::detect_from_fonts(&document.runs, &self.filter);
        let pattern = detectors::detect_from_page_patterns(&document.runs, &self.filter);
        let oracle_candidates = match oracle {
            Some(oracle) => match detectors::detect_from_oracle(
                &document.runs,
                oracle,
                &self.oracle_line,
            ) {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::warn!("oracle chapter detection failed: {e}");
                    notes.push(format!("oracle detection failed: {e}"));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut candidate_counts = BTreeMap::new();
        candidate_counts.insert("outline".to_string(), outline.len());
        candidate_counts.insert("font".to_string(), font.len());
        candidate_counts.insert("pattern".to_string(), pattern.len());
        candidate_counts.insert("oracle".to_string(), oracle_candidates.len());

        let boundaries = self.reconcile(outline, font, pattern, oracle_candidates);
        let confidence = combined_confidence(&boundaries);

        // Attribution reflects the boundaries that actually survived
        // reconciliation, not which detectors produced raw candidates.
        let methods_used: Vec<DetectionMethod> = boundaries
            .iter()
            .map(|b| b.method)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if boundaries.is_empty() {
            notes.push("no chapter boundaries detected".to_string());
        }

        log::info!(
            "chapter detection: {} boundaries, confidence {:.1}",
            boundaries.len(),
            confidence
        );

        ChapterStructure {
            boundaries,
            confidence,
            methods_used,
            candidate_counts,
            notes,
        }
    }

    /// Merge candidate lists in priority order. Outline candidates are
    /// accepted wholesale; each later candidate is dropped if it
    /// conflicts with anything already accepted.
    fn reconcile(
        &self,
        outline: Vec<ChapterBoundary>,
        font: Vec<ChapterBoundary>,
        pattern: Vec<ChapterBoundary>,
        oracle: Vec<ChapterBoundary>,
    ) -> Vec<ChapterBoundary> {
        let mut accepted = outline;

        for candidate in font.into_iter().chain(pattern).chain(oracle) {
            if !conflicts_with(&candidate, &accepted) {
                accepted.push(candidate);
            }
        }

        accepted.sort_by_key(|b| b.page);
        self.deduplicate(accepted)
    }

    /// Drop boundaries whose titles nearly repeat an earlier one, then
    /// normalize the survivors' titles.
    fn deduplicate(&self, sorted: Vec<ChapterBoundary>) -> Vec<ChapterBoundary> {
        let mut seen_titles: Vec<String> = Vec::new();
        let mut kept = Vec::new();

        for mut boundary in sorted {
            let incoming = boundary.title.to_lowercase();
            let duplicate = seen_titles
                .iter()
                .any(|seen| titles_similar(&incoming, seen, DUPLICATE_SIMILARITY));
            if duplicate {
                continue;
            }

            boundary.title = self.cleaner.clean(&boundary.title);
            seen_titles.push(boundary.title.to_lowercase());
            kept.push(boundary);
        }

        kept
    }
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A candidate conflicts when an accepted boundary sits on the same page
/// with a similar title, or within two pages with a similar title.
fn conflicts_with(candidate: &ChapterBoundary, accepted: &[ChapterBoundary]) -> bool {
    accepted.iter().any(|existing| {
        let same_page = candidate.page == existing.page;
        let near_page = candidate.page.abs_diff(existing.page) <= CONFLICT_PAGE_DISTANCE;
        (same_page || near_page)
            && titles_similar(&candidate.title, &existing.title, CONFLICT_SIMILARITY)
    })
}

/// Weighted mean of boundary confidences, weights by detection method.
fn combined_confidence(boundaries: &[ChapterBoundary]) -> f64 {
    if boundaries.is_empty() {
        return 0.0;
    }

    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for boundary in boundaries {
        let weight = boundary.method.weight();
        weighted += boundary.confidence * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}
