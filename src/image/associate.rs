//! Image-to-text association.
//!
//! Pairs each processed image with the text runs closest to it so the
//! output markup can keep figures near their captions and so alt-text
//! prompts carry surrounding context.

use crate::model::{ProcessedImage, TextPosition, TextRun};

/// Pages away from the image still considered for association.
const MAX_PAGE_DISTANCE: u32 = 1;

/// Base distance assigned to runs on a different page.
const CROSS_PAGE_BASE: f32 = 1000.0;

/// Additional distance per page of separation.
const CROSS_PAGE_STEP: f32 = 100.0;

/// Number of nearest runs joined into the association context.
const CONTEXT_RUNS: usize = 3;

/// Fill `associated_text` and `text_position` from the nearest runs.
pub(crate) fn associate(image: &mut ProcessedImage, runs: &[TextRun]) {
    let mut scored: Vec<(f32, &TextRun)> = runs
        .iter()
        .filter(|run| !run.text.trim().is_empty())
        .filter(|run| run.page.abs_diff(image.page) <= MAX_PAGE_DISTANCE)
        .map(|run| (distance(image, run), run))
        .collect();

    if scored.is_empty() {
        return;
    }

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let context: Vec<&str> = scored
        .iter()
        .take(CONTEXT_RUNS)
        .map(|(_, run)| run.text.trim())
        .collect();
    image.associated_text = Some(context.join(" "));

    // y grows downward, so a smaller y0 means the text starts above the
    // image and the image follows it.
    let nearest = scored[0].1;
    image.text_position = Some(if nearest.bbox.y0 < image.bbox.y0 {
        TextPosition::After
    } else {
        TextPosition::Before
    });
}

fn distance(image: &ProcessedImage, run: &TextRun) -> f32 {
    if run.page == image.page {
        (run.bbox.y0 - image.bbox.y0).abs() + (run.bbox.x0 - image.bbox.x0).abs()
    } else {
        CROSS_PAGE_BASE + CROSS_PAGE_STEP * run.page.abs_diff(image.page) as f32
    }
}
