//! Page layout analysis: columns, lines, reading order, tables.
//!
//! Works purely from positioned [`TextRun`]s; no access to the source
//! document is needed. All coordinates are top-left origin.

mod tables;

pub use tables::TableDetector;

use std::collections::HashSet;

use crate::model::{LayoutColumn, PageLayout, Rect, RegionKind, TextRegion, TextRun};

/// Horizontal gap between left edges that starts a new column.
const COLUMN_GAP: f32 = 20.0;

/// Vertical tolerance when folding runs into lines.
const LINE_TOLERANCE: f32 = 5.0;

/// Average font size above which a line is considered a heading.
const HEADING_FONT_SIZE: f32 = 14.0;

/// Left-edge clusters smaller than this are treated as stray runs
/// (centered headings, page numbers) rather than columns.
const MIN_COLUMN_RUNS: usize = 3;

/// A horizontal group of runs sharing a baseline.
#[derive(Debug)]
pub(crate) struct LayoutLine<'a> {
    pub(crate) y0: f32,
    pub(crate) runs: Vec<&'a TextRun>,
    /// Column the line belongs to on a multi-column page.
    pub(crate) column: Option<usize>,
}

impl<'a> LayoutLine<'a> {
    pub(crate) fn text(&self) -> String {
        self.runs
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn bbox(&self) -> Rect {
        let mut iter = self.runs.iter();
        let first = match iter.next() {
            Some(r) => r.bbox,
            None => return Rect::default(),
        };
        iter.fold(first, |acc, r| acc.merge(&r.bbox))
    }

    pub(crate) fn avg_font_size(&self) -> f32 {
        if self.runs.is_empty() {
            return 0.0;
        }
        let total: f32 = self.runs.iter().map(|r| r.font_size).sum();
        total / self.runs.len() as f32
    }
}

/// Analyzes the layout of one page at a time.
///
/// # Example
///
/// ```
/// use bookforge::layout::LayoutAnalyzer;
/// use bookforge::model::{Rect, TextRun};
///
/// let runs = vec![TextRun::new("Hello", Rect::new(72.0, 100.0, 120.0, 112.0), 1, 0)];
/// let layout = LayoutAnalyzer::new().analyze(1, &runs);
/// assert_eq!(layout.regions.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct LayoutAnalyzer {
    table_detector: TableDetector,
}

impl LayoutAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze the runs of one page.
    pub fn analyze(&self, page: u32, runs: &[TextRun]) -> PageLayout {
        if runs.is_empty() {
            return PageLayout {
                page,
                ..Default::default()
            };
        }

        let columns = detect_columns(runs);

        // Lines are folded per column so side-by-side columns never
        // interleave within one line.
        let lines = if columns.len() > 1 {
            let mut all = Vec::new();
            for column in &columns {
                let members: HashSet<u32> = column.run_ids.iter().copied().collect();
                let column_runs: Vec<&TextRun> = runs
                    .iter()
                    .filter(|r| members.contains(&r.sequence))
                    .collect();
                all.extend(group_into_lines(column_runs, Some(column.index)));
            }
            all
        } else {
            group_into_lines(runs.iter().collect(), None)
        };

        let (tables, table_lines) = self.table_detector.detect(page, &lines);
        let regions = build_regions(page, &lines, columns.len() > 1, &table_lines);

        PageLayout {
            page,
            columns,
            regions,
            tables,
        }
    }
}

/// Fold sorted left edges into columns, splitting on gaps wider than
/// [`COLUMN_GAP`]. Clusters below [`MIN_COLUMN_RUNS`] members do not
/// qualify; their runs are attached to the nearest surviving column.
fn detect_columns(runs: &[TextRun]) -> Vec<LayoutColumn> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));

    let mut clusters: Vec<Vec<&TextRun>> = Vec::new();
    let mut current: Vec<&TextRun> = Vec::new();
    for run in sorted {
        if let Some(last) = current.last() {
            if run.bbox.x0 - last.bbox.x0 > COLUMN_GAP {
                clusters.push(std::mem::take(&mut current));
            }
        }
        current.push(run);
    }
    if !current.is_empty() {
        clusters.push(current);
    }

    let (mut real, stray): (Vec<_>, Vec<_>) = clusters
        .into_iter()
        .partition(|c| c.len() >= MIN_COLUMN_RUNS);

    if real.len() < 2 {
        // One-column layout covering every run.
        let run_ids = runs.iter().map(|r| r.sequence).collect();
        let x0 = runs.iter().map(|r| r.bbox.x0).fold(f32::INFINITY, f32::min);
        let x1 = runs.iter().map(|r| r.bbox.x1).fold(f32::NEG_INFINITY, f32::max);
        return vec![LayoutColumn {
            index: 0,
            x0,
            x1,
            run_ids,
        }];
    }

    // Stray runs join whichever column starts closest.
    for run in stray.into_iter().flatten() {
        if let Some(nearest) = real.iter_mut().min_by(|a, b| {
            let da = (a[0].bbox.x0 - run.bbox.x0).abs();
            let db = (b[0].bbox.x0 - run.bbox.x0).abs();
            da.total_cmp(&db)
        }) {
            nearest.push(run);
        }
    }

    let mut columns: Vec<LayoutColumn> = real
        .into_iter()
        .map(|members| {
            let x0 = members
                .iter()
                .map(|r| r.bbox.x0)
                .fold(f32::INFINITY, f32::min);
            let x1 = members
                .iter()
                .map(|r| r.bbox.x1)
                .fold(f32::NEG_INFINITY, f32::max);
            LayoutColumn {
                index: 0,
                x0,
                x1,
                run_ids: members.iter().map(|r| r.sequence).collect(),
            }
        })
        .collect();

    columns.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    for (i, column) in columns.iter_mut().enumerate() {
        column.index = i;
    }
    columns
}

/// Fold runs into lines using the vertical tolerance, left to right
/// within each line.
fn group_into_lines(runs: Vec<&TextRun>, column: Option<usize>) -> Vec<LayoutLine<'_>> {
    let mut sorted = runs;
    sorted.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut lines: Vec<LayoutLine> = Vec::new();
    for run in sorted {
        match lines.last_mut() {
            Some(line) if (run.bbox.y0 - line.y0).abs() <= LINE_TOLERANCE => {
                line.runs.push(run);
            }
            _ => lines.push(LayoutLine {
                y0: run.bbox.y0,
                runs: vec![run],
                column,
            }),
        }
    }

    for line in &mut lines {
        line.runs.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    lines
}

fn build_regions(
    page: u32,
    lines: &[LayoutLine],
    multi_column: bool,
    table_lines: &HashSet<usize>,
) -> Vec<TextRegion> {
    let mut regions: Vec<TextRegion> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let kind = if table_lines.contains(&i) {
                RegionKind::Table
            } else if line.avg_font_size() > HEADING_FONT_SIZE {
                RegionKind::Heading
            } else {
                RegionKind::Text
            };

            TextRegion {
                text: line.text(),
                bbox: line.bbox(),
                page,
                kind,
                order: 0,
                column: line.column,
            }
        })
        .collect();

    if multi_column {
        // Columns left to right, each top to bottom.
        regions.sort_by(|a, b| {
            a.column
                .cmp(&b.column)
                .then(a.bbox.y0.total_cmp(&b.bbox.y0))
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
    } else {
        regions.sort_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
    }

    for (i, region) in regions.iter_mut().enumerate() {
        region.order = i;
    }
    regions
}
