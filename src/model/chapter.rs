//! Chapter structure types produced by multi-method detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which detector produced a boundary.
///
/// Variants are ordered by merge priority: when two detectors claim the
/// same chapter start, the earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Outline,
    Font,
    Pattern,
    Oracle,
}

impl DetectionMethod {
    /// Weight used when combining per-method confidences.
    pub fn weight(&self) -> f64 {
        match self {
            DetectionMethod::Outline => 1.0,
            DetectionMethod::Font => 0.8,
            DetectionMethod::Pattern => 0.6,
            DetectionMethod::Oracle => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Outline => "outline",
            DetectionMethod::Font => "font",
            DetectionMethod::Pattern => "pattern",
            DetectionMethod::Oracle => "oracle",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of the run that triggered a boundary, when one exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoundaryGeometry {
    /// Top edge of the triggering run
    pub y: f32,

    /// Font size of the triggering run
    pub font_size: f32,

    /// Whether the triggering run was bold
    pub is_bold: bool,
}

/// A single detected chapter start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterBoundary {
    /// Page the chapter starts on (1-indexed)
    pub page: u32,

    /// Chapter title
    pub title: String,

    /// Detection confidence in [0, 100]
    pub confidence: f64,

    /// Which detector produced this boundary
    pub method: DetectionMethod,

    /// Nesting level (0 = top level)
    pub level: u8,

    /// Geometry of the triggering run, if the detector had one
    pub geometry: Option<BoundaryGeometry>,
}

impl ChapterBoundary {
    pub fn new(page: u32, title: impl Into<String>, confidence: f64, method: DetectionMethod) -> Self {
        Self {
            page,
            title: title.into(),
            confidence: confidence.clamp(0.0, 100.0),
            method,
            level: 0,
            geometry: None,
        }
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_geometry(mut self, geometry: BoundaryGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// Reconciled chapter list with combined confidence and diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterStructure {
    /// Accepted boundaries, sorted ascending by page
    pub boundaries: Vec<ChapterBoundary>,

    /// Method-weighted combined confidence in [0, 100]
    pub confidence: f64,

    /// Methods that contributed at least one accepted boundary
    pub methods_used: Vec<DetectionMethod>,

    /// Candidate counts per method before reconciliation
    pub candidate_counts: BTreeMap<String, usize>,

    /// Free-form diagnostic notes (low confidence, detector failures)
    pub notes: Vec<String>,
}

impl ChapterStructure {
    /// An empty structure with zero confidence and a diagnostic note.
    pub fn empty(note: impl Into<String>) -> Self {
        Self {
            notes: vec![note.into()],
            ..Default::default()
        }
    }

    pub fn chapter_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Whether a given method contributed an accepted boundary.
    pub fn used(&self, method: DetectionMethod) -> bool {
        self.methods_used.contains(&method)
    }
}
