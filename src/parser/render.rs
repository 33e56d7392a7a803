//! Page rasterization through the poppler `pdftoppm` tool.
//!
//! Used by the OCR path when a page carries too little extractable text
//! to work from directly.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::exec::{probe_tool, run_with_timeout};
use crate::model::RenderedPage;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const RENDER_TIMEOUT: Duration = Duration::from_secs(120);

/// Renders single PDF pages to raster images via `pdftoppm`.
///
/// Construction probes the tool; an absent binary is a hard error so
/// callers can skip rasterization entirely instead of failing per page.
pub struct PageRenderer {
    version: String,
}

impl PageRenderer {
    pub fn new() -> Result<Self> {
        let version = probe_tool("pdftoppm", &["-v"], PROBE_TIMEOUT).ok_or_else(|| {
            Error::ExternalToolUnavailable {
                tool: "pdftoppm".to_string(),
            }
        })?;
        log::debug!("page renderer: {version}");
        Ok(Self { version })
    }

    /// Version line reported by the tool.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Render one page (1-indexed) at the given resolution.
    pub fn render_page(&self, pdf: &Path, page: u32, dpi: u32) -> Result<RenderedPage> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");

        let mut command = Command::new("pdftoppm");
        command
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix);

        let output = run_with_timeout(command, RENDER_TIMEOUT)?;
        if !output.success {
            return Err(Error::ExternalToolError {
                tool: "pdftoppm".to_string(),
                message: first_line(&output.stderr),
            });
        }

        // Output name is zero-padded by total page count, so locate it
        // rather than predict it.
        let png_path = find_rendered_png(dir.path()).ok_or_else(|| {
            Error::ExternalToolError {
                tool: "pdftoppm".to_string(),
                message: format!("no output produced for page {page}"),
            }
        })?;

        let data = std::fs::read(&png_path)?;
        let image = image::load_from_memory(&data)?.to_rgb8();

        Ok(RenderedPage { page, dpi, image })
    }
}

fn find_rendered_png(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext == "png"))
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string()
}
