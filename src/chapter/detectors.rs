//! The four chapter-boundary detectors.
//!
//! Each detector is a pure pass over parser output producing candidate
//! boundaries; reconciliation happens in the parent module.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::Result;
use crate::model::{
    BoundaryGeometry, ChapterBoundary, DetectionMethod, OutlineEntry, TextRun,
};
use crate::oracle::Oracle;

use super::heuristics::HeadingFilter;

/// Fraction of the avg-to-max font gap a run must clear to count as a
/// heading candidate.
const HEADING_GAP_FRACTION: f32 = 0.3;

/// Vertical band (from the page top) searched for page-start headings.
const TOP_BAND: f32 = 200.0;

/// Minimum font size for a page-start pattern candidate.
const PATTERN_MIN_FONT_SIZE: f32 = 14.0;

/// Fixed confidence for page-start pattern candidates.
const PATTERN_CONFIDENCE: f64 = 60.0;

/// Fixed confidence for oracle-named candidates.
const ORACLE_CONFIDENCE: f64 = 70.0;

/// Number of leading pages sampled for the oracle.
const ORACLE_SAMPLE_PAGES: usize = 20;

/// Minimum sample pages before the oracle is worth consulting.
const ORACLE_MIN_PAGES: usize = 3;

/// Compiled matcher for one "Page N: Title" line in an oracle response.
/// Built once per detector, next to the heading filter's pattern set.
pub(crate) fn oracle_line_pattern() -> Regex {
    Regex::new(r"(?i)^Page\s*(\d+):\s*(.+)$").unwrap()
}

/// Outline entries become boundaries at base confidence 90, nudged by
/// title and nesting quality. Page-number bookmarks ("7") and
/// one-character stubs are navigation noise, not chapters.
pub(crate) fn detect_from_outline(
    outline: &[OutlineEntry],
    filter: &HeadingFilter,
) -> Vec<ChapterBoundary> {
    let boundaries: Vec<ChapterBoundary> = outline
        .iter()
        .filter_map(|entry| {
            let title = entry.title.trim();
            if title.chars().count() < 2 || title.chars().all(|c| c.is_numeric()) {
                return None;
            }

            let mut confidence = 90.0;
            if filter.matches_numbering(title) {
                confidence += 5.0;
            }
            if title.chars().count() < 5 {
                confidence -= 10.0;
            }
            // Deeper than the second nesting level reads as a subsection.
            if entry.level > 1 {
                confidence -= 5.0;
            }

            Some(
                ChapterBoundary::new(entry.page, title, confidence, DetectionMethod::Outline)
                    .with_level(entry.level),
            )
        })
        .collect();

    log::debug!("outline detector: {} candidates", boundaries.len());
    boundaries
}

/// Font-geometry detection: bold runs materially larger than the document
/// average, at most one (the largest) per page.
pub(crate) fn detect_from_fonts(
    runs: &[TextRun],
    filter: &HeadingFilter,
) -> Vec<ChapterBoundary> {
    let sizes: Vec<f32> = runs
        .iter()
        .filter(|r| r.font_size > 0.0)
        .map(|r| r.font_size)
        .collect();
    if sizes.is_empty() {
        return Vec::new();
    }

    let avg = sizes.iter().sum::<f32>() / sizes.len() as f32;
    let max = sizes.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let threshold = avg + (max - avg) * HEADING_GAP_FRACTION;

    let mut boundaries = Vec::new();
    for (page, page_runs) in group_by_page(runs) {
        let best = page_runs
            .iter()
            .filter(|r| {
                r.font_size >= threshold
                    && r.is_bold
                    && r.text.trim().chars().count() > 2
                    && filter.is_likely_heading(&r.text)
            })
            .max_by(|a, b| a.font_size.total_cmp(&b.font_size));

        if let Some(run) = best {
            let confidence = font_confidence(run.font_size, avg, max, run.is_bold);
            boundaries.push(
                ChapterBoundary::new(
                    page,
                    run.text.trim(),
                    confidence,
                    DetectionMethod::Font,
                )
                .with_geometry(BoundaryGeometry {
                    y: run.bbox.y0,
                    font_size: run.font_size,
                    is_bold: run.is_bold,
                }),
            );
        }
    }

    log::debug!("font detector: {} candidates", boundaries.len());
    boundaries
}

/// Confidence scales 50 to 90 with position in the avg-to-max size gap,
/// plus 10 for bold.
fn font_confidence(size: f32, avg: f32, max: f32, is_bold: bool) -> f64 {
    let ratio = if max > avg {
        ((size - avg) / (max - avg)) as f64
    } else {
        0.0
    };
    let mut confidence = 50.0 + ratio * 40.0;
    if is_bold {
        confidence += 10.0;
    }
    confidence.clamp(0.0, 100.0)
}

/// Page-start pattern detection: the largest run in the page's top band,
/// when it is big enough and reads like a heading.
pub(crate) fn detect_from_page_patterns(
    runs: &[TextRun],
    filter: &HeadingFilter,
) -> Vec<ChapterBoundary> {
    let mut boundaries = Vec::new();

    for (page, page_runs) in group_by_page(runs) {
        let top = page_runs
            .iter()
            .filter(|r| r.bbox.y0 < TOP_BAND)
            .max_by(|a, b| a.font_size.total_cmp(&b.font_size));

        if let Some(run) = top {
            if run.font_size > PATTERN_MIN_FONT_SIZE && filter.is_likely_heading(&run.text) {
                boundaries.push(
                    ChapterBoundary::new(
                        page,
                        run.text.trim(),
                        PATTERN_CONFIDENCE,
                        DetectionMethod::Pattern,
                    )
                    .with_geometry(BoundaryGeometry {
                        y: run.bbox.y0,
                        font_size: run.font_size,
                        is_bold: run.is_bold,
                    }),
                );
            }
        }
    }

    log::debug!("pattern detector: {} candidates", boundaries.len());
    boundaries
}

/// Ask the oracle to name chapter starts over a sample of leading pages.
pub(crate) fn detect_from_oracle(
    runs: &[TextRun],
    oracle: &dyn Oracle,
    line_pattern: &Regex,
) -> Result<Vec<ChapterBoundary>> {
    let mut pages_text: BTreeMap<u32, String> = BTreeMap::new();
    for run in runs {
        let entry = pages_text.entry(run.page).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(&run.text);
    }

    let sample: Vec<(&u32, &String)> = pages_text.iter().take(ORACLE_SAMPLE_PAGES).collect();
    if sample.len() < ORACLE_MIN_PAGES {
        return Ok(Vec::new());
    }

    let mut sample_text = String::new();
    for (page, text) in &sample {
        let snippet: String = text.chars().take(200).collect();
        sample_text.push_str(&format!("Page {page}:\n{snippet}...\n\n"));
    }

    let prompt = format!(
        "Analyze this document sample and identify chapter boundaries.\n\
         Look for chapter titles, section headings, or major topic changes.\n\
         Return the page numbers and titles where chapters begin.\n\n\
         Document sample:\n{sample_text}\n\
         Format your response as:\n\
         Page X: [Chapter Title]\n\
         Page Y: [Chapter Title]\n\n\
         Only return definite chapter starts, be conservative."
    );

    let response = oracle.describe_text(&prompt)?;
    let boundaries = parse_oracle_response(&response, &pages_text, line_pattern);

    log::debug!("oracle detector: {} candidates", boundaries.len());
    Ok(boundaries)
}

/// Parse "Page N: Title" lines, substituting real page text when the
/// oracle's title is too generic to be useful.
fn parse_oracle_response(
    response: &str,
    pages_text: &BTreeMap<u32, String>,
    line_pattern: &Regex,
) -> Vec<ChapterBoundary> {
    let mut boundaries = Vec::new();

    for line in response.lines() {
        let Some(caps) = line_pattern.captures(line.trim()) else {
            continue;
        };
        let Ok(page) = caps[1].parse::<u32>() else {
            continue;
        };
        let Some(page_text) = pages_text.get(&page) else {
            continue;
        };

        let mut title = caps[2].trim().to_string();
        if is_generic_title(&title) {
            let head: String = page_text.chars().take(100).collect();
            title = head
                .split('.')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        }

        if title.chars().count() > 2 {
            boundaries.push(ChapterBoundary::new(
                page,
                title,
                ORACLE_CONFIDENCE,
                DetectionMethod::Oracle,
            ));
        }
    }

    boundaries
}

fn is_generic_title(title: &str) -> bool {
    title.chars().count() < 3
        || matches!(
            title.to_lowercase().as_str(),
            "chapter" | "section" | "part"
        )
}

fn group_by_page(runs: &[TextRun]) -> BTreeMap<u32, Vec<&TextRun>> {
    let mut pages: BTreeMap<u32, Vec<&TextRun>> = BTreeMap::new();
    for run in runs {
        pages.entry(run.page).or_default().push(run);
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;

    fn heading_run(page: u32, text: &str, size: f32, bold: bool, y0: f32, seq: u32) -> TextRun {
        let mut run = TextRun::new(
            text,
            Rect::new(72.0, y0, 300.0, y0 + size),
            page,
            seq,
        )
        .with_font(if bold { "Helvetica-Bold" } else { "Helvetica" }, size);
        run.is_bold = bold;
        run
    }

    #[test]
    fn test_outline_confidence_adjustments() {
        let filter = HeadingFilter::new();
        let outline = vec![
            OutlineEntry {
                level: 0,
                title: "Chapter 1".into(),
                page: 1,
            },
            OutlineEntry {
                level: 0,
                title: "Ack".into(),
                page: 90,
            },
            OutlineEntry {
                level: 3,
                title: "Deep subsection here".into(),
                page: 40,
            },
        ];
        let boundaries = detect_from_outline(&outline, &filter);

        // "Chapter 1" gets the numbering boost: 90 + 5
        assert_eq!(boundaries[0].confidence, 95.0);
        // Short title: 90 - 10
        assert_eq!(boundaries[1].confidence, 80.0);
        // Deep nesting: 90 - 5
        assert_eq!(boundaries[2].confidence, 85.0);
    }

    #[test]
    fn test_outline_skips_junk_bookmark_titles() {
        let filter = HeadingFilter::new();
        let outline = vec![
            OutlineEntry {
                level: 0,
                title: "Introduction".into(),
                page: 1,
            },
            OutlineEntry {
                level: 0,
                title: "7".into(),
                page: 7,
            },
            OutlineEntry {
                level: 0,
                title: "  42  ".into(),
                page: 12,
            },
            OutlineEntry {
                level: 0,
                title: "x".into(),
                page: 15,
            },
            OutlineEntry {
                level: 0,
                title: "Conclusion".into(),
                page: 25,
            },
        ];
        let boundaries = detect_from_outline(&outline, &filter);

        let titles: Vec<&str> = boundaries.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Introduction", "Conclusion"]);
    }

    #[test]
    fn test_font_detector_keeps_largest_per_page() {
        let filter = HeadingFilter::new();
        let runs = vec![
            heading_run(1, "Introduction", 20.0, true, 80.0, 0),
            heading_run(1, "Prologue", 18.0, true, 300.0, 1),
            heading_run(1, "body", 10.0, false, 400.0, 2),
            heading_run(1, "body", 10.0, false, 420.0, 3),
        ];
        let boundaries = detect_from_fonts(&runs, &filter);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].title, "Introduction");
        assert_eq!(boundaries[0].method, DetectionMethod::Font);
        assert!(boundaries[0].geometry.is_some());
    }

    #[test]
    fn test_font_detector_requires_bold() {
        let filter = HeadingFilter::new();
        let runs = vec![
            heading_run(1, "Big But Regular", 24.0, false, 80.0, 0),
            heading_run(1, "body", 10.0, false, 300.0, 1),
        ];
        assert!(detect_from_fonts(&runs, &filter).is_empty());
    }

    #[test]
    fn test_font_confidence_range() {
        // At the max size, ratio 1.0: 50 + 40 + 10 = 100
        assert_eq!(font_confidence(20.0, 10.0, 20.0, true), 100.0);
        // Flat document: ratio 0
        assert_eq!(font_confidence(10.0, 10.0, 10.0, false), 50.0);
        // Halfway, not bold
        assert_eq!(font_confidence(15.0, 10.0, 20.0, false), 70.0);
    }

    #[test]
    fn test_pattern_detector_top_band_only() {
        let filter = HeadingFilter::new();
        let runs = vec![
            // Large heading below the top band is ignored
            heading_run(1, "Epilogue", 22.0, true, 350.0, 0),
            heading_run(1, "body", 10.0, false, 380.0, 1),
            // Page 2 has one in the band
            heading_run(2, "Appendix", 18.0, false, 60.0, 2),
            heading_run(2, "body", 10.0, false, 400.0, 3),
        ];
        let boundaries = detect_from_page_patterns(&runs, &filter);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].page, 2);
        assert_eq!(boundaries[0].title, "Appendix");
        assert_eq!(boundaries[0].confidence, PATTERN_CONFIDENCE);
    }

    #[test]
    fn test_pattern_detector_needs_large_font() {
        let filter = HeadingFilter::new();
        let runs = vec![heading_run(1, "Small Title", 12.0, false, 50.0, 0)];
        assert!(detect_from_page_patterns(&runs, &filter).is_empty());
    }

    #[test]
    fn test_parse_oracle_response() {
        let mut pages = BTreeMap::new();
        pages.insert(3, "The Voyage Begins. More text follows.".to_string());
        pages.insert(9, "Storms at Sea and open water.".to_string());

        let response = "Page 3: The Voyage Begins\nPage 9: chapter\nnoise line";
        let boundaries = parse_oracle_response(response, &pages, &oracle_line_pattern());

        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].page, 3);
        assert_eq!(boundaries[0].title, "The Voyage Begins");
        // Generic "chapter" replaced by the page's own first sentence.
        assert_eq!(boundaries[1].title, "Storms at Sea and open water");
        assert!(boundaries
            .iter()
            .all(|b| b.confidence == ORACLE_CONFIDENCE));
    }

    #[test]
    fn test_parse_oracle_response_unknown_page_dropped() {
        let pages = BTreeMap::new();
        let response = "Page 5: Ghost Chapter";
        assert!(parse_oracle_response(response, &pages, &oracle_line_pattern()).is_empty());
    }
}
