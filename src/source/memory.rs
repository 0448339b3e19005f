//! In-memory [`PdfSource`] for callers that already hold text or spans.
//!
//! Plain text is laid out on a US-Letter page with a fixed 12 pt font: one
//! span per line, 14 pt line pitch, blank lines widening the gap so they read
//! as block breaks, and leading spaces turned into a horizontal offset so
//! indentation survives layout analysis.

use super::{
    BoundingBox, PageImage, PageLayout, PdfSource, RawTable, SourceBlock, SourceError, SourceLine,
    SourceSpan,
};
use image::DynamicImage;
use std::collections::HashMap;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const BODY_SIZE: f32 = 12.0;
const BODY_FONT: &str = "Times-Roman";
/// Advance per character: half the font size.
const CHAR_ADVANCE: f32 = 0.5;
const LINE_PITCH: f32 = 1.2;
const BLOCK_GAP: f32 = 2.4;

/// A font-tagged span given directly by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySpan {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
    pub size: f32,
    pub font: String,
}

impl MemorySpan {
    pub fn new(text: impl Into<String>, size: f32) -> Self {
        Self {
            page: 1,
            text: text.into(),
            size,
            font: BODY_FONT.into(),
        }
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }
}

/// Document held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: Vec<PageLayout>,
    plain: Vec<String>,
    tables: Vec<RawTable>,
    images: Vec<PageImage>,
    renders: HashMap<usize, DynamicImage>,
    failure: Option<String>,
}

impl MemorySource {
    /// One or more pages of plain text; form feeds (`\x0c`) separate pages.
    pub fn from_text(text: &str) -> Self {
        Self::from_pages(text.split('\x0c'))
    }

    /// One entry per page.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::default();
        for (idx, text) in pages.into_iter().enumerate() {
            let text = text.as_ref();
            source.pages.push(layout_text(idx + 1, text));
            source.plain.push(text.to_string());
        }
        source
    }

    /// Font-tagged spans; each span becomes its own line, stacked in order.
    pub fn from_spans(spans: Vec<MemorySpan>) -> Self {
        let page_count = spans.iter().map(|s| s.page).max().unwrap_or(1);
        let mut source = Self::default();
        for number in 1..=page_count {
            let mut y = MARGIN;
            let mut block = SourceBlock::default();
            let mut plain = String::new();
            for s in spans.iter().filter(|s| s.page == number) {
                let size = if s.size > 0.0 { s.size } else { BODY_SIZE };
                y += size * LINE_PITCH;
                block.lines.push(SourceLine {
                    spans: vec![SourceSpan {
                        text: s.text.clone(),
                        font: s.font.clone(),
                        size,
                        bbox: text_box(&s.text, MARGIN, y, size),
                    }],
                });
                plain.push_str(&s.text);
                plain.push('\n');
            }
            let blocks = if block.lines.is_empty() {
                Vec::new()
            } else {
                vec![block]
            };
            source.pages.push(PageLayout {
                number,
                width: PAGE_WIDTH,
                height: PAGE_HEIGHT,
                blocks,
                image_count: 0,
            });
            source.plain.push(plain);
        }
        source
    }

    /// `pages` image-only pages: no text layer, one full-page image each.
    pub fn scanned(pages: usize) -> Self {
        let mut source = Self::default();
        for number in 1..=pages.max(1) {
            source.pages.push(PageLayout {
                number,
                width: PAGE_WIDTH,
                height: PAGE_HEIGHT,
                blocks: Vec::new(),
                image_count: 1,
            });
            source.plain.push(String::new());
            source.images.push(PageImage {
                page: number,
                index: 0,
                image: DynamicImage::new_luma8(850, 1100),
            });
        }
        source
    }

    /// A source whose every call fails, as a corrupt file would.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Add a table candidate anchored nowhere in particular.
    pub fn with_table(mut self, page: usize, rows: Vec<Vec<String>>) -> Self {
        self.tables.push(RawTable {
            page,
            rows,
            bbox: None,
        });
        self
    }

    /// Add an embedded image to `page`.
    pub fn with_image(mut self, page: usize, image: DynamicImage) -> Self {
        let index = self.images.iter().filter(|i| i.page == page).count();
        self.images.push(PageImage { page, index, image });
        if let Some(p) = self.pages.iter_mut().find(|p| p.number == page) {
            p.image_count += 1;
        }
        self
    }

    /// Bitmap returned by [`PdfSource::render_page`] for `page`, at any zoom.
    pub fn with_render(mut self, page: usize, image: DynamicImage) -> Self {
        self.renders.insert(page, image);
        self
    }

    fn check(&self) -> Result<(), SourceError> {
        match &self.failure {
            Some(reason) => Err(SourceError::Open(reason.clone())),
            None => Ok(()),
        }
    }
}

fn text_box(text: &str, x: f32, baseline: f32, size: f32) -> BoundingBox {
    let width = text.chars().count() as f32 * size * CHAR_ADVANCE;
    BoundingBox::new(x, baseline - size, x + width, baseline)
}

fn layout_text(number: usize, text: &str) -> PageLayout {
    let mut blocks = Vec::new();
    let mut block = SourceBlock::default();
    let mut y = MARGIN;
    let mut gap = 0.0;

    for raw in text.lines() {
        if raw.trim().is_empty() {
            if !block.lines.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
            gap = BODY_SIZE * BLOCK_GAP;
            continue;
        }
        y += BODY_SIZE * LINE_PITCH + gap;
        gap = 0.0;
        let indent = raw.chars().take_while(|c| *c == ' ').count();
        let content = raw.trim();
        let x = MARGIN + indent as f32 * BODY_SIZE * CHAR_ADVANCE;
        block.lines.push(SourceLine {
            spans: vec![SourceSpan {
                text: content.to_string(),
                font: BODY_FONT.into(),
                size: BODY_SIZE,
                bbox: text_box(content, x, y, BODY_SIZE),
            }],
        });
    }
    if !block.lines.is_empty() {
        blocks.push(block);
    }

    PageLayout {
        number,
        width: PAGE_WIDTH,
        height: PAGE_HEIGHT,
        blocks,
        image_count: 0,
    }
}

impl PdfSource for MemorySource {
    fn page_count(&self) -> Result<usize, SourceError> {
        self.check()?;
        Ok(self.pages.len())
    }

    fn pages(&self) -> Result<Vec<PageLayout>, SourceError> {
        self.check()?;
        Ok(self.pages.clone())
    }

    fn plain_text(&self, page: usize) -> Result<String, SourceError> {
        self.check()?;
        self.plain
            .get(page.wrapping_sub(1))
            .cloned()
            .ok_or(SourceError::OutOfRange {
                page,
                total: self.plain.len(),
            })
    }

    fn images(&self) -> Result<Vec<PageImage>, SourceError> {
        self.check()?;
        Ok(self.images.clone())
    }

    fn table_candidates(&self) -> Result<Vec<RawTable>, SourceError> {
        self.check()?;
        Ok(self.tables.clone())
    }

    fn render_page(&self, page: usize, _zoom: f32) -> Result<DynamicImage, SourceError> {
        self.check()?;
        self.renders
            .get(&page)
            .cloned()
            .ok_or_else(|| SourceError::Page {
                page,
                detail: "no rendering available".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_lines_become_spans() {
        let src = MemorySource::from_text("1. Introduction\nThis is the first paragraph.");
        let pages = src.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].blocks.len(), 1);
        assert_eq!(pages[0].blocks[0].lines.len(), 2);
        assert_eq!(pages[0].blocks[0].lines[0].spans[0].text, "1. Introduction");
    }

    #[test]
    fn blank_lines_split_blocks() {
        let src = MemorySource::from_text("Main content.\n\nArticle Name — Page 5");
        let pages = src.pages().unwrap();
        assert_eq!(pages[0].blocks.len(), 2);
    }

    #[test]
    fn form_feed_splits_pages() {
        let src = MemorySource::from_text("page one\x0cpage two");
        assert_eq!(src.page_count().unwrap(), 2);
        assert_eq!(src.plain_text(2).unwrap(), "page two");
        assert!(src.plain_text(3).is_err());
    }

    #[test]
    fn indentation_becomes_offset() {
        let src = MemorySource::from_text("left\n    indented");
        let pages = src.pages().unwrap();
        let lines = &pages[0].blocks[0].lines;
        assert!(lines[1].spans[0].bbox.x0 > lines[0].spans[0].bbox.x0 + 20.0);
    }

    #[test]
    fn spans_keep_their_size() {
        let src = MemorySource::from_spans(vec![
            MemorySpan::new("Introduction", 16.0),
            MemorySpan::new("This is a paragraph", 12.0),
        ]);
        let pages = src.pages().unwrap();
        let lines = &pages[0].blocks[0].lines;
        assert_eq!(lines[0].spans[0].size, 16.0);
        assert_eq!(lines[1].spans[0].size, 12.0);
    }

    #[test]
    fn scanned_pages_have_images_only() {
        let src = MemorySource::scanned(3);
        let pages = src.pages().unwrap();
        assert!(pages.iter().all(|p| p.char_count() == 0 && p.image_count == 1));
        assert_eq!(src.images().unwrap().len(), 3);
    }

    #[test]
    fn failing_source_errors_everywhere() {
        let src = MemorySource::failing("xref table is corrupt");
        assert!(matches!(src.pages(), Err(SourceError::Open(_))));
        assert!(src.images().is_err());
        assert!(src.render_page(1, 2.0).is_err());
    }
}
