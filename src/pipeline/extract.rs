//! Stage 1: embedded text extraction and the scanned-PDF gate.
//!
//! Walks the source layout (blocks → lines → spans) and flattens it into
//! [`Span`]s in reading order. Pages whose layout is empty but whose
//! plain-text fallback is not get synthetic body-size spans, one per line.
//! The stage also decides whether the document is image-only; the
//! orchestrator stops right after this stage when it is.

use super::context::{ConversionContext, Field, PageInfo, PageText, Span, TextOrigin};
use super::layout;
use super::{Stage, StageEnv, StageReport};
use crate::error::StageError;
use crate::source::{BoundingBox, PageLayout};
use tracing::debug;

/// Pages below this many non-whitespace characters count as text-poor.
pub const MIN_TEXT_CHARS_PER_PAGE: usize = 50;

/// Average characters per page below which an image-bearing document is
/// treated as scanned.
const SCANNED_MAX_AVG_CHARS: usize = 10;

/// Font size given to spans synthesised from the plain-text fallback.
const FALLBACK_SIZE: f32 = 12.0;
const FALLBACK_MARGIN: f32 = 72.0;

/// Decide whether a document is image-only from its per-page character and
/// image counts.
pub fn looks_scanned(char_counts: &[usize], image_counts: &[usize]) -> bool {
    let pages = char_counts.len();
    if pages == 0 {
        return false;
    }
    let chars: usize = char_counts.iter().sum();
    let images: usize = image_counts.iter().sum();
    let pages_with_images = image_counts.iter().filter(|n| **n > 0).count();
    (chars == 0 && images > 0)
        || (chars / pages < SCANNED_MAX_AVG_CHARS && pages_with_images >= pages)
}

/// Reads the embedded text layer.
pub struct ExtractText;

impl Stage for ExtractText {
    fn name(&self) -> &'static str {
        "extract-text"
    }

    fn reads(&self) -> &'static [Field] {
        &[]
    }

    fn writes(&self) -> &'static [Field] {
        &[
            Field::Spans,
            Field::Pages,
            Field::PageTexts,
            Field::RawText,
            Field::Scanned,
        ]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let layouts = env
            .source
            .pages()
            .map_err(|e| StageError::Source(e.to_string()))?;

        let mut spans = Vec::new();
        let mut pages = Vec::with_capacity(layouts.len());
        let mut page_texts = Vec::with_capacity(layouts.len());
        let mut fallback_pages = 0usize;

        for page in &layouts {
            let mut page_spans = spans_of(page);
            if page_spans.is_empty() {
                // A fallback failure leaves the page empty rather than failing the document.
                let plain = env.source.plain_text(page.number).unwrap_or_default();
                if !plain.trim().is_empty() {
                    fallback_pages += 1;
                    page_spans = spans_from_plain(page.number, &plain);
                }
            }
            let char_count: usize = page_spans
                .iter()
                .map(|s| s.text.chars().filter(|c| !c.is_whitespace()).count())
                .sum();

            let refs: Vec<&Span> = page_spans.iter().collect();
            let blocks = layout::blocks(layout::lines_from_spans(&refs));
            page_texts.push(PageText {
                page: page.number,
                text: layout::page_text(&blocks),
                origin: TextOrigin::Embedded,
                heading_hints: Vec::new(),
            });
            pages.push(PageInfo {
                number: page.number,
                width: page.width,
                height: page.height,
                image_count: page.image_count,
                char_count,
            });
            spans.extend(page_spans);
        }

        let char_counts: Vec<usize> = pages.iter().map(|p| p.char_count).collect();
        let image_counts: Vec<usize> = pages.iter().map(|p| p.image_count).collect();
        let scanned = looks_scanned(&char_counts, &image_counts);
        let raw_text = page_texts
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(
            pages = pages.len(),
            spans = spans.len(),
            chars = char_counts.iter().sum::<usize>(),
            fallback_pages,
            scanned,
            "embedded text extracted"
        );

        let note = format!("{} pages, {} spans", pages.len(), spans.len());
        ctx.set_spans(spans);
        ctx.set_pages(pages);
        ctx.set_page_texts(page_texts);
        ctx.set_raw_text(raw_text);
        ctx.set_scanned(scanned);

        Ok(StageReport::done().with_note(if scanned {
            format!("{note}; scanned")
        } else {
            note
        }))
    }
}

/// Every non-empty span of the page, ordered top to bottom then left to
/// right whatever order the source produced them in.
fn spans_of(page: &PageLayout) -> Vec<Span> {
    let mut spans: Vec<Span> = page
        .blocks
        .iter()
        .flat_map(|b| &b.lines)
        .flat_map(|l| &l.spans)
        .filter(|s| !s.text.is_empty())
        .map(|s| Span {
            page: page.number,
            text: s.text.clone(),
            font: s.font.clone(),
            size: s.size,
            x: s.bbox.x0,
            y: s.bbox.y1,
            bbox: s.bbox,
        })
        .collect();
    spans.sort_by(|a, b| {
        a.bbox
            .y0
            .total_cmp(&b.bbox.y0)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    spans
}

fn spans_from_plain(page: usize, text: &str) -> Vec<Span> {
    let pitch = FALLBACK_SIZE * 1.2;
    let mut y = FALLBACK_MARGIN;
    let mut out = Vec::new();
    for line in text.lines() {
        y += pitch;
        let content = line.trim();
        if content.is_empty() {
            y += pitch;
            continue;
        }
        let width = content.chars().count() as f32 * FALLBACK_SIZE * 0.5;
        out.push(Span {
            page,
            text: content.to_string(),
            font: String::new(),
            size: FALLBACK_SIZE,
            x: FALLBACK_MARGIN,
            y,
            bbox: BoundingBox::new(
                FALLBACK_MARGIN,
                y - FALLBACK_SIZE,
                FALLBACK_MARGIN + width,
                y,
            ),
        });
    }
    out
}
