//! Tabular region detection from line geometry.
//!
//! A line qualifies as a table row when it carries several words at
//! regular horizontal intervals; runs of adjacent qualifying lines with
//! enough non-empty rows become tables.

use std::collections::HashSet;

use crate::model::{Rect, TableRegion};

use super::LayoutLine;

/// Minimum words per line before gap regularity is considered.
const MIN_ROW_WORDS: usize = 3;

/// Maximum coefficient of variation for gaps to count as regular.
const MAX_GAP_VARIATION: f32 = 0.3;

/// Minimum non-empty rows for an accepted table.
const MIN_TABLE_ROWS: usize = 2;

#[derive(Debug, Default)]
pub struct TableDetector;

impl TableDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect tables among the page's lines.
    ///
    /// Returns the accepted tables plus the indices (into `lines`) of
    /// every line that belongs to one.
    pub(crate) fn detect(
        &self,
        page: u32,
        lines: &[LayoutLine],
    ) -> (Vec<TableRegion>, HashSet<usize>) {
        let mut tables = Vec::new();
        let mut table_lines = HashSet::new();

        let mut i = 0;
        while i < lines.len() {
            if !is_row_candidate(&lines[i]) {
                i += 1;
                continue;
            }

            // Extend across adjacent candidate lines in the same column.
            let start = i;
            let column = lines[i].column;
            let mut end = i + 1;
            while end < lines.len()
                && lines[end].column == column
                && is_row_candidate(&lines[end])
            {
                end += 1;
            }

            let candidate = &lines[start..end];
            let non_empty = candidate
                .iter()
                .filter(|l| l.runs.iter().any(|r| !r.text.trim().is_empty()))
                .count();

            if non_empty >= MIN_TABLE_ROWS {
                tables.push(build_table(page, candidate));
                table_lines.extend(start..end);
            }

            i = end;
        }

        (tables, table_lines)
    }
}

/// Regular-gap test: at least [`MIN_ROW_WORDS`] runs whose start-to-start
/// distances vary by less than [`MAX_GAP_VARIATION`] of their mean.
fn is_row_candidate(line: &LayoutLine) -> bool {
    if line.runs.len() < MIN_ROW_WORDS {
        return false;
    }

    let starts: Vec<f32> = line.runs.iter().map(|r| r.bbox.x0).collect();
    let gaps: Vec<f32> = starts.windows(2).map(|w| w[1] - w[0]).collect();

    let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
    if mean <= 0.0 {
        return false;
    }

    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / gaps.len() as f32;
    variance.sqrt() < MAX_GAP_VARIATION * mean
}

fn build_table(page: u32, lines: &[LayoutLine]) -> TableRegion {
    let cells: Vec<Vec<String>> = lines
        .iter()
        .map(|l| l.runs.iter().map(|r| r.text.clone()).collect())
        .collect();

    let cols = cells.iter().map(|row| row.len()).max().unwrap_or(0);

    let bbox = lines
        .iter()
        .map(|l| l.bbox())
        .reduce(|acc, b| acc.merge(&b))
        .unwrap_or_else(Rect::default);

    TableRegion {
        bbox,
        page,
        rows: cells.len(),
        cols,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextRun;

    fn make_runs(texts: &[&str], xs: &[f32], y0: f32) -> Vec<TextRun> {
        texts
            .iter()
            .zip(xs)
            .enumerate()
            .map(|(i, (t, &x))| {
                TextRun::new(
                    t.to_string(),
                    Rect::new(x, y0, x + 40.0, y0 + 11.0),
                    1,
                    i as u32,
                )
            })
            .collect()
    }

    fn as_line(runs: &[TextRun], y0: f32) -> LayoutLine<'_> {
        LayoutLine {
            y0,
            runs: runs.iter().collect(),
            column: None,
        }
    }

    #[test]
    fn test_regular_gaps_detected_as_table() {
        let r1 = make_runs(&["Name", "Qty", "Price"], &[72.0, 200.0, 328.0], 100.0);
        let r2 = make_runs(&["Apple", "3", "1.50"], &[72.0, 200.0, 328.0], 120.0);
        let r3 = make_runs(&["Pear", "1", "0.80"], &[72.0, 200.0, 328.0], 140.0);
        let lines = vec![as_line(&r1, 100.0), as_line(&r2, 120.0), as_line(&r3, 140.0)];

        let (tables, members) = TableDetector::new().detect(1, &lines);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, 3);
        assert_eq!(tables[0].cols, 3);
        assert_eq!(members.len(), 3);
        assert_eq!(tables[0].cells[1][0], "Apple");
    }

    #[test]
    fn test_irregular_gaps_rejected() {
        let r1 = make_runs(&["word", "and", "more"], &[72.0, 120.0, 400.0], 100.0);
        let r2 = make_runs(&["plain", "prose", "here"], &[72.0, 140.0, 180.0], 120.0);
        let lines = vec![as_line(&r1, 100.0), as_line(&r2, 120.0)];

        let (tables, members) = TableDetector::new().detect(1, &lines);
        assert!(tables.is_empty());
        assert!(members.is_empty());
    }

    #[test]
    fn test_single_row_rejected() {
        let r1 = make_runs(&["A", "B", "C"], &[72.0, 200.0, 328.0], 100.0);
        let r2 = make_runs(&["prose"], &[72.0], 120.0);
        let lines = vec![as_line(&r1, 100.0), as_line(&r2, 120.0)];

        let (tables, _) = TableDetector::new().detect(1, &lines);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_two_word_line_not_a_row() {
        let r1 = make_runs(&["just", "two"], &[72.0, 200.0], 100.0);
        let r2 = make_runs(&["words", "again"], &[72.0, 200.0], 120.0);
        let lines = vec![as_line(&r1, 100.0), as_line(&r2, 120.0)];

        let (tables, _) = TableDetector::new().detect(1, &lines);
        assert!(tables.is_empty());
    }
}
