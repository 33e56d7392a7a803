//! Pipeline stage records and final conversion results.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One stage of the conversion pipeline with its progress weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage name ("pdf_analysis", "content_extraction", ...)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Progress weight; weights across all stages sum to 1.0
    pub weight: f64,

    /// Whether the stage ran to completion
    pub completed: bool,

    /// Failure recorded at the stage boundary, if any
    pub error: Option<String>,

    /// Wall-clock duration of the stage
    pub duration: Duration,
}

impl PipelineStage {
    pub fn new(name: &str, description: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            completed: false,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Which execution path produced the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMethod {
    /// The custom five-stage pipeline
    Custom,
    /// The external converter fallback
    External,
    /// Neither path produced output
    Failed,
}

impl std::fmt::Display for ConversionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionMethod::Custom => f.write_str("custom"),
            ConversionMethod::External => f.write_str("external"),
            ConversionMethod::Failed => f.write_str("failed"),
        }
    }
}

/// Final result of one conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Whether an output document was produced
    pub success: bool,

    /// Path of the produced document
    pub output_path: Option<PathBuf>,

    /// User-visible failure description
    pub error: Option<String>,

    /// Total wall-clock duration
    pub duration: Duration,

    /// Overall quality score in [0, 100]
    pub quality_score: f64,

    /// Which path produced the output
    pub method: ConversionMethod,

    /// Names of the stages that completed
    pub stages_completed: Vec<String>,

    /// Additional result details (chapter count, image count, ...)
    pub metadata: BTreeMap<String, String>,
}

impl ConversionResult {
    /// A failure result carrying only the error.
    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            output_path: None,
            error: Some(error.into()),
            duration,
            quality_score: 0.0,
            method: ConversionMethod::Failed,
            stages_completed: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Quality signals parsed from the external tool's output streams.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FallbackIndicators {
    /// Pages the tool reported processing
    pub pages_processed: u32,

    /// Images the tool reported finding
    pub images_extracted: u32,

    /// Whether a table of contents was generated
    pub toc_generated: bool,

    /// Whether source metadata was carried over
    pub metadata_preserved: bool,

    /// Count of warning lines
    pub warnings_count: u32,
}

/// Outcome of one external-converter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResult {
    /// Whether the tool exited 0 and produced non-empty output
    pub success: bool,

    /// Path of the produced document
    pub output_path: Option<PathBuf>,

    /// Failure description when unsuccessful
    pub error: Option<String>,

    /// Wall-clock duration of the invocation
    pub duration: Duration,

    /// The command line that was run
    pub command: Vec<String>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Output file size in bytes (0 when absent)
    pub output_size: u64,

    /// Parsed quality signals
    pub indicators: FallbackIndicators,
}
