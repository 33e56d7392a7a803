//! Benchmarks for chapter detection performance.
//!
//! Run with: cargo bench
//!
//! Detection runs over synthetic documents with a known heading layout.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bookforge::chapter::titles_similar;
use bookforge::model::{OutlineEntry, ParsedDocument, Rect, TextRun};
use bookforge::ChapterDetector;

/// Build a document with a bold heading every tenth page and plain body
/// text everywhere, optionally mirrored by outline entries.
fn synthetic_document(pages: u32, with_outline: bool) -> ParsedDocument {
    let mut document = ParsedDocument::default();
    document.metadata.page_count = pages;

    let mut sequence = 0u32;
    for page in 1..=pages {
        if page % 10 == 1 {
            let section = page / 10 + 1;
            let title = format!("Section {section}");
            document.runs.push(
                TextRun::new(&title, Rect::new(72.0, 60.0, 320.0, 84.0), page, sequence)
                    .with_font("Helvetica-Bold", 22.0),
            );
            sequence += 1;

            if with_outline {
                document.outline.push(OutlineEntry {
                    level: 0,
                    title,
                    page,
                });
            }
        }

        for line in 0..5u32 {
            let y = 210.0 + line as f32 * 16.0;
            document.runs.push(
                TextRun::new(
                    format!("Body line {line} follows its page without standing out."),
                    Rect::new(72.0, y, 540.0, y + 12.0),
                    page,
                    sequence,
                )
                .with_font("Helvetica", 10.5),
            );
            sequence += 1;
        }
    }

    document.metadata.has_outline = with_outline;
    document
}

/// Benchmark full detection at various document sizes.
fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("chapter_detection");
    let detector = ChapterDetector::new();

    for page_count in [10, 50, 200].iter() {
        let outlined = synthetic_document(*page_count, true);
        group.bench_function(format!("{}_pages_outlined", page_count), |b| {
            b.iter(|| detector.detect(black_box(&outlined), None));
        });

        let plain = synthetic_document(*page_count, false);
        group.bench_function(format!("{}_pages_headings_only", page_count), |b| {
            b.iter(|| detector.detect(black_box(&plain), None));
        });
    }

    group.finish();
}

/// Benchmark the title comparison used for merge and dedup decisions.
fn bench_title_similarity(c: &mut Criterion) {
    c.bench_function("title_similarity", |b| {
        b.iter(|| {
            titles_similar(
                black_box("Chapter 12: Rivers in Winter"),
                black_box("chapter 12 rivers in winter"),
                0.8,
            )
        });
    });
}

/// Benchmark detector construction, which compiles its pattern set.
fn bench_detector_creation(c: &mut Criterion) {
    c.bench_function("detector_creation", |b| {
        b.iter(|| {
            let _detector = ChapterDetector::new();
        });
    });
}

criterion_group!(
    benches,
    bench_detection,
    bench_title_similarity,
    bench_detector_creation,
);
criterion_main!(benches);
