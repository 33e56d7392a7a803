//! Content stream interpretation: positioned text runs and image placements.
//!
//! Walks a page's content stream tracking the text matrix and a simplified
//! CTM stack, emitting [`TextRun`]s in drawing order plus the placed
//! rectangle of every `Do`-invoked XObject. All output coordinates use a
//! top-left origin (y grows downward), converted from PDF space using the
//! page height.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{Rect, TextRun};
use crate::parser::backend::{ContentOp, PdfBackend, PdfValue};

/// Negative TJ adjustment (in thousandths of text space) treated as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Default line leading when none has been set via TL or TD.
const DEFAULT_LEADING: f32 = 12.0;

/// Text and image geometry recovered from one page.
#[derive(Debug, Default)]
pub struct PageSpans {
    /// Text runs in drawing order. `sequence` is page-local here;
    /// the caller re-numbers globally.
    pub runs: Vec<TextRun>,
    /// XObject name → placed rectangle, for image bbox resolution.
    pub placements: HashMap<String, Rect>,
}

/// Text matrix state (simplified 2D affine transform).
#[derive(Debug, Clone, Copy)]
struct TextMatrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
    /// Y position at the start of the current line, for T* handling.
    line_y: f32,
}

impl TextMatrix {
    fn new() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
            line_y: 0.0,
        }
    }

    fn set(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        self.e = e;
        self.f = f;
        self.line_y = f;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.e += tx * self.a + ty * self.c;
        self.f += tx * self.b + ty * self.d;
        self.line_y = self.f;
    }

    fn next_line(&mut self, leading: f32) {
        self.f = self.line_y - leading;
        self.line_y = self.f;
    }

    fn position(&self) -> (f32, f32) {
        (self.e, self.f)
    }

    /// Horizontal scale factor applied to the nominal font size.
    fn scale(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }
}

/// Simplified graphics-state matrix, tracked only far enough to place
/// XObject images on the page.
#[derive(Debug, Clone, Copy)]
struct GraphicsMatrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl GraphicsMatrix {
    fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Concatenate: self = m × self.
    fn concat(&mut self, m: GraphicsMatrix) {
        let a = m.a * self.a + m.b * self.c;
        let b = m.a * self.b + m.b * self.d;
        let c = m.c * self.a + m.d * self.c;
        let d = m.c * self.b + m.d * self.d;
        let e = m.e * self.a + m.f * self.c + self.e;
        let f = m.e * self.b + m.f * self.d + self.f;
        *self = Self { a, b, c, d, e, f };
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// Extracts positioned text runs and image placements from content streams.
pub struct SpanExtractor<'a, B: PdfBackend> {
    backend: &'a B,
}

impl<'a, B: PdfBackend> SpanExtractor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Walk the content stream of one page.
    ///
    /// `page` is the 1-based page number, `page_id` the backend identifier.
    pub fn extract_page(&self, page: u32, page_id: (u32, u16)) -> Result<PageSpans> {
        let (_, page_height) = self.backend.page_size(page_id)?;
        let content = self.backend.page_content(page_id)?;
        let ops = self.backend.decode_content(&content)?;
        Ok(self.walk(page, page_id, page_height, &ops))
    }

    fn walk(&self, page: u32, page_id: (u32, u16), page_height: f32, ops: &[ContentOp]) -> PageSpans {
        let mut out = PageSpans::default();

        // Resource name → base font name, for bold detection on emitted runs.
        let fonts: HashMap<Vec<u8>, String> = self
            .backend
            .page_fonts(page_id)
            .unwrap_or_default()
            .into_iter()
            .map(|f| (f.name, f.base_font))
            .collect();

        let mut matrix = TextMatrix::new();
        let mut current_font: Vec<u8> = Vec::new();
        let mut font_size: f32 = 12.0;
        let mut leading: f32 = DEFAULT_LEADING;

        let mut ctm = GraphicsMatrix::identity();
        let mut ctm_stack: Vec<GraphicsMatrix> = Vec::new();

        let mut sequence: u32 = 0;

        for op in ops {
            match op.operator.as_str() {
                "BT" => {
                    matrix = TextMatrix::new();
                }
                "Tf" => {
                    if let Some(PdfValue::Name(name)) = op.operands.first() {
                        current_font = name.clone();
                    }
                    if let Some(size) = op.operands.get(1).and_then(PdfValue::as_number) {
                        font_size = size;
                    }
                }
                "TL" => {
                    if let Some(l) = op.operands.first().and_then(PdfValue::as_number) {
                        leading = l;
                    }
                }
                "Td" => {
                    let tx = op.operands.first().and_then(PdfValue::as_number).unwrap_or(0.0);
                    let ty = op.operands.get(1).and_then(PdfValue::as_number).unwrap_or(0.0);
                    matrix.translate(tx, ty);
                }
                "TD" => {
                    let tx = op.operands.first().and_then(PdfValue::as_number).unwrap_or(0.0);
                    let ty = op.operands.get(1).and_then(PdfValue::as_number).unwrap_or(0.0);
                    leading = -ty;
                    matrix.translate(tx, ty);
                }
                "Tm" => {
                    let n: Vec<f32> = op
                        .operands
                        .iter()
                        .filter_map(PdfValue::as_number)
                        .collect();
                    if n.len() >= 6 {
                        matrix.set(n[0], n[1], n[2], n[3], n[4], n[5]);
                    }
                }
                "T*" => {
                    matrix.next_line(leading);
                }
                "Tj" => {
                    if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                        let text = self.backend.decode_text(page_id, &current_font, bytes);
                        emit(
                            &mut out, &mut matrix, &mut sequence, page, page_height,
                            &fonts, &current_font, font_size, &text,
                        );
                    }
                }
                "TJ" => {
                    if let Some(PdfValue::Array(items)) = op.operands.first() {
                        let mut text = String::new();
                        for item in items {
                            match item {
                                PdfValue::Str(bytes) => {
                                    text.push_str(
                                        &self.backend.decode_text(page_id, &current_font, bytes),
                                    );
                                }
                                PdfValue::Integer(i) => {
                                    if (*i as f32) < -TJ_SPACE_THRESHOLD {
                                        text.push(' ');
                                    }
                                }
                                PdfValue::Real(r) => {
                                    if *r < -TJ_SPACE_THRESHOLD {
                                        text.push(' ');
                                    }
                                }
                                _ => {}
                            }
                        }
                        emit(
                            &mut out, &mut matrix, &mut sequence, page, page_height,
                            &fonts, &current_font, font_size, &text,
                        );
                    }
                }
                "'" => {
                    matrix.next_line(leading);
                    if let Some(PdfValue::Str(bytes)) = op.operands.first() {
                        let text = self.backend.decode_text(page_id, &current_font, bytes);
                        emit(
                            &mut out, &mut matrix, &mut sequence, page, page_height,
                            &fonts, &current_font, font_size, &text,
                        );
                    }
                }
                "\"" => {
                    matrix.next_line(leading);
                    if let Some(PdfValue::Str(bytes)) = op.operands.get(2) {
                        let text = self.backend.decode_text(page_id, &current_font, bytes);
                        emit(
                            &mut out, &mut matrix, &mut sequence, page, page_height,
                            &fonts, &current_font, font_size, &text,
                        );
                    }
                }
                "q" => {
                    ctm_stack.push(ctm);
                }
                "Q" => {
                    if let Some(saved) = ctm_stack.pop() {
                        ctm = saved;
                    }
                }
                "cm" => {
                    let n: Vec<f32> = op
                        .operands
                        .iter()
                        .filter_map(PdfValue::as_number)
                        .collect();
                    if n.len() >= 6 {
                        ctm.concat(GraphicsMatrix {
                            a: n[0],
                            b: n[1],
                            c: n[2],
                            d: n[3],
                            e: n[4],
                            f: n[5],
                        });
                    }
                }
                "Do" => {
                    if let Some(PdfValue::Name(name)) = op.operands.first() {
                        let rect = placed_rect(&ctm, page_height);
                        out.placements
                            .insert(String::from_utf8_lossy(name).to_string(), rect);
                    }
                }
                _ => {}
            }
        }

        out
    }

}

#[allow(clippy::too_many_arguments)]
fn emit(
    out: &mut PageSpans,
    matrix: &mut TextMatrix,
    sequence: &mut u32,
    page: u32,
    page_height: f32,
    fonts: &HashMap<Vec<u8>, String>,
    font_name: &[u8],
    font_size: f32,
    text: &str,
) {
    if text.is_empty() {
        return;
    }

    let (x, y) = matrix.position();
    let size = font_size * matrix.scale();
    let width = estimate_width(text, size);

    // PDF y is the baseline measured from the bottom; flip to a
    // top-left origin with ascent 0.8 and descent 0.2 of the size.
    let y_top = page_height - y - size * 0.8;
    let bbox = Rect {
        x0: x,
        y0: y_top,
        x1: x + width,
        y1: y_top + size,
    };

    let base_font = fonts
        .get(font_name)
        .cloned()
        .unwrap_or_else(|| String::from_utf8_lossy(font_name).to_string());
    let run = TextRun::new(text, bbox, page, *sequence).with_font(base_font, size);
    *sequence += 1;
    out.runs.push(run);

    // Advance the pen so successive shows on one line stay ordered.
    matrix.e += width;
}

/// Approximate advance width: CJK glyphs are treated as full-width,
/// everything else as half-width.
fn estimate_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| {
            if ('\u{4E00}'..='\u{9FFF}').contains(&c)
                || ('\u{3000}'..='\u{30FF}').contains(&c)
                || ('\u{AC00}'..='\u{D7AF}').contains(&c)
            {
                size
            } else {
                size * 0.5
            }
        })
        .sum()
}

/// The unit square transformed by the CTM, flipped to top-left coordinates.
fn placed_rect(ctm: &GraphicsMatrix, page_height: f32) -> Rect {
    let corners = [
        ctm.apply(0.0, 0.0),
        ctm.apply(1.0, 0.0),
        ctm.apply(0.0, 1.0),
        ctm.apply(1.0, 1.0),
    ];
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

    Rect {
        x0: min_x,
        y0: page_height - max_y,
        x1: max_x,
        y1: page_height - min_y,
    }
}
