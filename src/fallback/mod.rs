//! External converter fallback.
//!
//! Wraps Calibre's `ebook-convert` as the safety net behind the custom
//! pipeline. Availability is probed once at construction; conversion
//! runs under a hard wall-clock timeout and both output streams are
//! parsed for quality signals whatever the exit status.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::exec;
use crate::model::{FallbackIndicators, FallbackResult};

const TOOL: &str = "ebook-convert";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wall-clock budget for one conversion.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default quality score below which the fallback takes over.
const DEFAULT_QUALITY_THRESHOLD: f64 = 60.0;

/// Bytes of the source sampled for the language guess.
const LANGUAGE_SAMPLE_BYTES: usize = 1024;

/// Fallback behavior configuration.
#[derive(Debug, Clone)]
pub struct FallbackOptions {
    /// Master switch; when false the fallback never triggers.
    pub enabled: bool,

    /// Custom-pipeline quality score below which the fallback runs.
    pub quality_threshold: f64,

    /// Wall-clock budget for one external conversion.
    pub timeout: Duration,

    /// Flag overrides merged over the defaults. A `None` value means a
    /// bare flag without an argument.
    pub flag_overrides: BTreeMap<String, Option<String>>,
}

impl FallbackOptions {
    pub fn new() -> Self {
        Self {
            enabled: true,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            flag_overrides: BTreeMap::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.flag_overrides.insert(flag.into(), value);
        self
    }
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Source-document traits that justify skipping the custom path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityHints {
    pub encrypted: bool,
    pub drm: bool,
    pub complex_layout: bool,
}

/// Wrapper around the `ebook-convert` command-line tool.
pub struct CalibreConverter {
    options: FallbackOptions,
    version: Option<String>,
    pages_pattern: Regex,
}

impl CalibreConverter {
    pub fn new() -> Self {
        Self::with_options(FallbackOptions::new())
    }

    pub fn with_options(options: FallbackOptions) -> Self {
        let version = exec::probe_tool(TOOL, &["--version"], PROBE_TIMEOUT);
        match &version {
            Some(v) => log::info!("{} available: {}", TOOL, v),
            None => log::warn!("{} not found, fallback conversion disabled", TOOL),
        }

        Self {
            options,
            version,
            pages_pattern: Regex::new(r"(\d+)\s+pages?").unwrap(),
        }
    }

    /// Whether the fallback is enabled and the tool was found.
    pub fn is_available(&self) -> bool {
        self.options.enabled && self.version.is_some()
    }

    /// Version line reported by the probe, when the tool was found.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Convert `input` to `output` with the external tool.
    ///
    /// Failures come back inside the result rather than as errors so the
    /// pipeline can report them alongside the custom path's outcome.
    pub fn convert(&self, input: &Path, output: &Path) -> FallbackResult {
        let started = Instant::now();

        if !self.is_available() {
            return failed_result("external converter is not available", started.elapsed());
        }

        if let Some(parent) = output.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return failed_result(
                    format!("cannot create output directory: {e}"),
                    started.elapsed(),
                );
            }
        }

        let command_line = self.build_command(input, output);
        log::info!("running fallback: {}", command_line.join(" "));

        let mut command = Command::new(&command_line[0]);
        command.args(&command_line[1..]);

        match exec::run_with_timeout(command, self.options.timeout) {
            Ok(run) => {
                let indicators = self.parse_indicators(&run.stdout, &run.stderr);
                let output_size = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
                let success = run.success && output_size > 0;

                let error = if success {
                    None
                } else if !run.stderr.trim().is_empty() {
                    Some(run.stderr.trim().to_string())
                } else if !run.stdout.trim().is_empty() {
                    Some(run.stdout.trim().to_string())
                } else {
                    Some("unknown error".to_string())
                };

                if success {
                    log::info!(
                        "fallback conversion succeeded in {:.1}s ({} bytes)",
                        run.duration.as_secs_f64(),
                        output_size
                    );
                } else {
                    log::error!(
                        "fallback conversion failed: {}",
                        error.as_deref().unwrap_or("unknown")
                    );
                }

                FallbackResult {
                    success,
                    output_path: success.then(|| output.to_path_buf()),
                    error,
                    duration: started.elapsed(),
                    command: command_line,
                    stdout: run.stdout,
                    stderr: run.stderr,
                    output_size,
                    indicators,
                }
            }
            Err(e) => {
                log::error!("fallback conversion aborted: {e}");
                FallbackResult {
                    success: false,
                    output_path: None,
                    error: Some(e.to_string()),
                    duration: started.elapsed(),
                    command: command_line,
                    stdout: String::new(),
                    stderr: String::new(),
                    output_size: 0,
                    indicators: FallbackIndicators::default(),
                }
            }
        }
    }

    /// Decide whether the fallback should run, with the winning reason.
    ///
    /// Priority: explicit user request, then a custom-pipeline error,
    /// then the quality threshold, then source complexity. Always `None`
    /// when the tool is unavailable.
    pub fn should_fallback(
        &self,
        quality_score: f64,
        error_occurred: bool,
        user_requested: bool,
        hints: &ComplexityHints,
    ) -> Option<String> {
        if !self.is_available() {
            return None;
        }

        if user_requested {
            return Some("user requested external conversion".to_string());
        }
        if error_occurred {
            return Some("custom pipeline encountered an unrecoverable error".to_string());
        }
        if quality_score < self.options.quality_threshold {
            return Some(format!(
                "quality score {:.1} below threshold {:.1}",
                quality_score, self.options.quality_threshold
            ));
        }
        if hints.encrypted {
            return Some("document is encrypted".to_string());
        }
        if hints.drm {
            return Some("document carries DRM protection".to_string());
        }
        if hints.complex_layout {
            return Some("layout too complex for structure recovery".to_string());
        }

        None
    }

    fn build_command(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut flags: BTreeMap<String, Option<String>> = BTreeMap::from([
            ("--pdf-engine".to_string(), Some("mupdf".to_string())),
            ("--enable-heuristics".to_string(), None),
            ("--keep-ligatures".to_string(), None),
            ("--no-inline-toc".to_string(), None),
            ("--pretty-print".to_string(), None),
            (
                "--language".to_string(),
                Some(detect_language_flag(input).to_string()),
            ),
        ]);
        for (flag, value) in &self.options.flag_overrides {
            flags.insert(flag.clone(), value.clone());
        }

        let mut command = vec![
            TOOL.to_string(),
            input.to_string_lossy().to_string(),
            output.to_string_lossy().to_string(),
        ];
        for (flag, value) in flags {
            command.push(flag);
            if let Some(value) = value {
                command.push(value);
            }
        }
        command
    }

    /// Pull quality signals out of the tool's chatter.
    fn parse_indicators(&self, stdout: &str, stderr: &str) -> FallbackIndicators {
        let mut indicators = FallbackIndicators::default();

        for line in stdout.lines().chain(stderr.lines()) {
            let line = line.to_lowercase();

            if let Some(captures) = self.pages_pattern.captures(&line) {
                if let Ok(pages) = captures[1].parse() {
                    indicators.pages_processed = pages;
                }
            }
            if line.contains("image") || line.contains("extracting") {
                indicators.images_extracted += 1;
            }
            if line.contains("toc") || line.contains("table of contents") {
                indicators.toc_generated = true;
            }
            if line.contains("metadata") {
                indicators.metadata_preserved = true;
            }
            if line.contains("warn") {
                indicators.warnings_count += 1;
            }
        }

        indicators
    }
}

impl Default for CalibreConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn failed_result(error: impl Into<String>, duration: Duration) -> FallbackResult {
    FallbackResult {
        success: false,
        output_path: None,
        error: Some(error.into()),
        duration,
        command: Vec::new(),
        stdout: String::new(),
        stderr: String::new(),
        output_size: 0,
        indicators: FallbackIndicators::default(),
    }
}

/// Guess "zh" or "en" from CJK characters in the source's first
/// kilobyte, decoded leniently.
fn detect_language_flag(path: &Path) -> &'static str {
    let mut sample = vec![0u8; LANGUAGE_SAMPLE_BYTES];
    let read = fs::File::open(path)
        .and_then(|mut f| f.read(&mut sample))
        .unwrap_or(0);
    sample.truncate(read);

    let text = String::from_utf8_lossy(&sample);
    if text
        .chars()
        .any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
    {
        "zh"
    } else {
        "en"
    }
}
