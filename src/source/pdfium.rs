//! [`PdfSource`] over the pdfium C++ library.
//!
//! ## Why reopen per call?
//!
//! `PdfDocument` borrows the `Pdfium` instance, so holding both in one struct
//! makes it self-referential. Reopening costs a few milliseconds per stage and
//! keeps the source a plain `(path, password)` pair that is `Send + Sync`.
//!
//! ## Why group characters ourselves?
//!
//! pdfium reports text per character (with font, size, and box) or per
//! segment (without font data). Spans need both, so this module walks the
//! characters and cuts them into runs wherever the font, the size, or the
//! baseline changes.
//!
//! All calls are blocking; callers run them inside `spawn_blocking`.

use super::{
    BoundingBox, PageImage, PageLayout, PdfSource, SourceBlock, SourceError, SourceLine,
    SourceSpan,
};
use crate::error::Pdf2MdError;
use crate::output::DocumentMetadata;
use crate::pipeline::extract::{looks_scanned, MIN_TEXT_CHARS_PER_PAGE};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to a pdfium library.
///
/// Search order: `PDFIUM_LIB_PATH`, the working directory, then the system
/// library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2MdError> {
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| Pdf2MdError::PdfiumBindingFailed(format!("{env_path}: {e}")));
        }
        debug!("PDFIUM_LIB_PATH '{}' does not exist; searching further", env_path);
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| Pdf2MdError::PdfiumBindingFailed(e.to_string()))
}

/// A PDF file on disk read through pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumSource {
    path: PathBuf,
    password: Option<String>,
}

impl PdfiumSource {
    pub fn new(path: impl Into<PathBuf>, password: Option<String>) -> Self {
        Self {
            path: path.into(),
            password,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_document<T>(
        &self,
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let pdfium = bind_pdfium().map_err(|e| SourceError::Open(e.to_string()))?;
        let document = pdfium
            .load_pdf_from_file(&self.path, self.password.as_deref())
            .map_err(|e| SourceError::Open(format!("{}: {:?}", self.path.display(), e)))?;
        f(&document)
    }

    /// Document metadata plus per-page text/image counts.
    pub fn metadata(&self) -> Result<DocumentMetadata, SourceError> {
        self.with_document(|document| {
            let metadata = document.metadata();
            let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
                metadata.get(tag).and_then(|t| {
                    let v = t.value().trim().to_string();
                    if v.is_empty() {
                        None
                    } else {
                        Some(v)
                    }
                })
            };

            let mut char_counts = Vec::new();
            let mut image_counts = Vec::new();
            for page in document.pages().iter() {
                char_counts.push(
                    page.text()
                        .map(|t| t.all().chars().filter(|c| !c.is_whitespace()).count())
                        .unwrap_or(0),
                );
                image_counts.push(count_images(&page));
            }
            let text_pages = char_counts
                .iter()
                .filter(|&&n| n >= MIN_TEXT_CHARS_PER_PAGE)
                .count();
            let image_pages = image_counts.iter().filter(|&&n| n > 0).count();

            Ok(DocumentMetadata {
                title: get_meta(PdfDocumentMetadataTagType::Title),
                author: get_meta(PdfDocumentMetadataTagType::Author),
                subject: get_meta(PdfDocumentMetadataTagType::Subject),
                creator: get_meta(PdfDocumentMetadataTagType::Creator),
                producer: get_meta(PdfDocumentMetadataTagType::Producer),
                creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
                modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
                page_count: document.pages().len() as usize,
                pdf_version: format!("{:?}", document.version()),
                text_pages,
                image_pages,
                scanned_pdf: looks_scanned(&char_counts, &image_counts),
            })
        })
    }
}

fn count_images(page: &PdfPage<'_>) -> usize {
    page.objects()
        .iter()
        .filter(|o| o.object_type() == PdfPageObjectType::Image)
        .count()
}

impl PdfSource for PdfiumSource {
    fn page_count(&self) -> Result<usize, SourceError> {
        self.with_document(|d| Ok(d.pages().len() as usize))
    }

    fn pages(&self) -> Result<Vec<PageLayout>, SourceError> {
        self.with_document(|document| {
            let mut layouts = Vec::new();
            for (idx, page) in document.pages().iter().enumerate() {
                let number = idx + 1;
                let width = page.width().value;
                let height = page.height().value;
                let text = page.text().map_err(|e| SourceError::Page {
                    page: number,
                    detail: format!("{:?}", e),
                })?;

                let mut glyphs = Vec::new();
                for ch in text.chars().iter() {
                    let Some(c) = ch.unicode_char() else { continue };
                    let Ok(rect) = ch.loose_bounds() else { continue };
                    glyphs.push(Glyph {
                        ch: c,
                        font: ch.font_name(),
                        size: ch.scaled_font_size().value,
                        bbox: BoundingBox::new(
                            rect.left().value,
                            height - rect.top().value,
                            rect.right().value,
                            height - rect.bottom().value,
                        ),
                    });
                }

                let mut layout = layout_from_glyphs(number, width, height, &glyphs);
                layout.image_count = count_images(&page);
                debug!(
                    page = number,
                    blocks = layout.blocks.len(),
                    images = layout.image_count,
                    "page layout extracted"
                );
                layouts.push(layout);
            }
            info!("pdfium: {} pages laid out", layouts.len());
            Ok(layouts)
        })
    }

    fn plain_text(&self, page: usize) -> Result<String, SourceError> {
        self.with_document(|document| {
            let total = document.pages().len() as usize;
            if page == 0 || page > total {
                return Err(SourceError::OutOfRange { page, total });
            }
            let p = document
                .pages()
                .get((page - 1) as u16)
                .map_err(|e| SourceError::Page {
                    page,
                    detail: format!("{:?}", e),
                })?;
            p.text().map(|t| t.all()).map_err(|e| SourceError::Page {
                page,
                detail: format!("{:?}", e),
            })
        })
    }

    fn images(&self) -> Result<Vec<PageImage>, SourceError> {
        self.with_document(|document| {
            let mut images = Vec::new();
            for (idx, page) in document.pages().iter().enumerate() {
                let mut index = 0;
                for object in page.objects().iter() {
                    let Some(image_object) = object.as_image_object() else { continue };
                    match image_object.get_raw_image() {
                        Ok(image) => {
                            images.push(PageImage {
                                page: idx + 1,
                                index,
                                image,
                            });
                            index += 1;
                        }
                        Err(e) => debug!(page = idx + 1, "skipping undecodable image: {:?}", e),
                    }
                }
            }
            Ok(images)
        })
    }

    fn render_page(&self, page: usize, zoom: f32) -> Result<DynamicImage, SourceError> {
        self.with_document(|document| {
            let total = document.pages().len() as usize;
            if page == 0 || page > total {
                return Err(SourceError::OutOfRange { page, total });
            }
            let p = document
                .pages()
                .get((page - 1) as u16)
                .map_err(|e| SourceError::Page {
                    page,
                    detail: format!("{:?}", e),
                })?;
            let config = PdfRenderConfig::new().scale_page_by_factor(zoom);
            let bitmap = p.render_with_config(&config).map_err(|e| SourceError::Page {
                page,
                detail: format!("render at zoom {zoom}: {:?}", e),
            })?;
            Ok(bitmap.as_image())
        })
    }
}

// ── Glyph grouping ───────────────────────────────────────────────────────

/// One positioned character as reported by pdfium.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Glyph {
    pub ch: char,
    pub font: String,
    pub size: f32,
    pub bbox: BoundingBox,
}

/// Baseline drift (fraction of font size) that still counts as the same line.
const SAME_LINE_TOLERANCE: f32 = 0.5;
/// Horizontal gap (fraction of font size) that splits a run into two spans.
const SPAN_GAP_FACTOR: f32 = 0.25;
/// Vertical gap (fraction of line height) that starts a new block.
const BLOCK_GAP_FACTOR: f32 = 1.5;

/// Group characters into spans, lines, and blocks.
///
/// Characters arrive in content-stream order. A new line starts when the
/// baseline moves by more than half the font size or the pen jumps back to the
/// left; a new span starts on a font or size change or a visible gap; a new
/// block starts when the vertical gap between lines exceeds 1.5 line heights.
pub(crate) fn layout_from_glyphs(
    number: usize,
    width: f32,
    height: f32,
    glyphs: &[Glyph],
) -> PageLayout {
    let mut lines: Vec<SourceLine> = Vec::new();
    let mut line = SourceLine::default();
    let mut span: Option<SourceSpan> = None;

    let flush_span = |line: &mut SourceLine, span: &mut Option<SourceSpan>| {
        if let Some(mut s) = span.take() {
            let trimmed = s.text.trim_end().len();
            s.text.truncate(trimmed);
            if !s.text.trim().is_empty() {
                line.spans.push(s);
            }
        }
    };

    for g in glyphs {
        if g.ch == '\r' || g.ch == '\n' {
            flush_span(&mut line, &mut span);
            if !line.spans.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            continue;
        }
        if g.ch.is_whitespace() {
            if let Some(s) = span.as_mut() {
                if !s.text.ends_with(' ') {
                    s.text.push(' ');
                }
            }
            continue;
        }

        if let Some(s) = span.as_ref() {
            let size = s.size.max(g.size).max(1.0);
            let baseline_moved = (g.bbox.y1 - s.bbox.y1).abs() > size * SAME_LINE_TOLERANCE;
            let went_left = g.bbox.x0 < s.bbox.x0 - size;
            if baseline_moved || went_left {
                flush_span(&mut line, &mut span);
                if !line.spans.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
            } else {
                let gap = g.bbox.x0 - s.bbox.x1;
                let restyled = s.font != g.font || (s.size - g.size).abs() > 0.5;
                if restyled || (gap > size * SPAN_GAP_FACTOR && !s.text.ends_with(' ')) {
                    flush_span(&mut line, &mut span);
                }
            }
        }

        match span.as_mut() {
            Some(s) => {
                s.text.push(g.ch);
                s.bbox = BoundingBox::new(
                    s.bbox.x0.min(g.bbox.x0),
                    s.bbox.y0.min(g.bbox.y0),
                    s.bbox.x1.max(g.bbox.x1),
                    s.bbox.y1.max(g.bbox.y1),
                );
            }
            None => {
                span = Some(SourceSpan {
                    text: g.ch.to_string(),
                    font: g.font.clone(),
                    size: g.size,
                    bbox: g.bbox,
                })
            }
        }
    }
    flush_span(&mut line, &mut span);
    if !line.spans.is_empty() {
        lines.push(line);
    }

    let mut blocks: Vec<SourceBlock> = Vec::new();
    let mut prev_bottom: Option<(f32, f32)> = None;
    for l in lines {
        let top = l.spans.iter().map(|s| s.bbox.y0).fold(f32::MAX, f32::min);
        let bottom = l.spans.iter().map(|s| s.bbox.y1).fold(f32::MIN, f32::max);
        let line_height = (bottom - top).max(1.0);
        let new_block = match prev_bottom {
            None => true,
            Some((pb, ph)) => top - pb > ph.max(line_height) * BLOCK_GAP_FACTOR,
        };
        if new_block || blocks.is_empty() {
            blocks.push(SourceBlock::default());
        }
        if let Some(b) = blocks.last_mut() {
            b.lines.push(l);
        }
        prev_bottom = Some((bottom, line_height));
    }

    PageLayout {
        number,
        width,
        height,
        blocks,
        image_count: 0,
    }
}
