//! Layout analysis output types: columns, regions, tables.

use serde::{Deserialize, Serialize};

use super::document::Rect;

/// A detected column of text on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutColumn {
    /// Column index (0 = leftmost)
    pub index: usize,

    /// Left boundary
    pub x0: f32,

    /// Right boundary
    pub x1: f32,

    /// Sequence ids of the member runs
    pub run_ids: Vec<u32>,
}

impl LayoutColumn {
    /// Check if an x coordinate falls within this column.
    pub fn contains(&self, x: f32) -> bool {
        x >= self.x0 && x <= self.x1
    }
}

/// Classification of a merged text region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Text,
    Heading,
    Table,
}

/// One or more runs merged into a logical region with a reading-order slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegion {
    /// Merged text content
    pub text: String,

    /// Bounding box covering all member runs
    pub bbox: Rect,

    /// Page number (1-indexed)
    pub page: u32,

    /// Region classification
    pub kind: RegionKind,

    /// Position in the page's reading order (0-based)
    pub order: usize,

    /// Column the region belongs to, if the page is multi-column
    pub column: Option<usize>,
}

/// A detected tabular region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegion {
    /// Bounding box of the table
    pub bbox: Rect,

    /// Page number (1-indexed)
    pub page: u32,

    /// Number of rows
    pub rows: usize,

    /// Number of columns
    pub cols: usize,

    /// Cell contents, row-major
    pub cells: Vec<Vec<String>>,
}

/// Full layout analysis result for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    /// Page number (1-indexed)
    pub page: u32,

    /// Detected columns, left to right
    pub columns: Vec<LayoutColumn>,

    /// Text regions in reading order
    pub regions: Vec<TextRegion>,

    /// Detected tables
    pub tables: Vec<TableRegion>,
}

impl PageLayout {
    /// Whether the page has a multi-column layout.
    pub fn is_multi_column(&self) -> bool {
        self.columns.len() > 1
    }

    /// Text of the page in reading order.
    pub fn ordered_text(&self) -> String {
        self.regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_contains() {
        let col = LayoutColumn {
            index: 0,
            x0: 50.0,
            x1: 280.0,
            run_ids: vec![],
        };
        assert!(col.contains(50.0));
        assert!(col.contains(200.0));
        assert!(!col.contains(281.0));
    }

    #[test]
    fn test_ordered_text() {
        let layout = PageLayout {
            page: 1,
            columns: vec![],
            regions: vec![
                TextRegion {
                    text: "First".into(),
                    bbox: Rect::default(),
                    page: 1,
                    kind: RegionKind::Heading,
                    order: 0,
                    column: None,
                },
                TextRegion {
                    text: "Second".into(),
                    bbox: Rect::default(),
                    page: 1,
                    kind: RegionKind::Text,
                    order: 1,
                    column: None,
                },
            ],
            tables: vec![],
        };
        assert_eq!(layout.ordered_text(), "First\nSecond");
    }
}
