//! The conversion context: a structured record threaded through the stages.
//!
//! Every derived field is an `Option` that starts empty. Stages advertise the
//! [`Field`]s they read and write; the orchestrator checks at construction
//! that each read is produced by an earlier stage. Setters only ever store a
//! value, so a field once written is never removed. Locale, content kind,
//! and source identifier are fixed at construction and have no setters.

use crate::config::{ContentKind, Locale};
use crate::output::OcrPageSummary;
use crate::source::BoundingBox;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Names of the context's derived fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Spans,
    Pages,
    PageTexts,
    RawText,
    Scanned,
    Tables,
    Images,
    OcrReport,
    Markdown,
    Strategy,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Spans => "spans",
            Field::Pages => "pages",
            Field::PageTexts => "page_texts",
            Field::RawText => "raw_text",
            Field::Scanned => "scanned",
            Field::Tables => "tables",
            Field::Images => "images",
            Field::OcrReport => "ocr_report",
            Field::Markdown => "markdown",
            Field::Strategy => "strategy",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Extraction records ───────────────────────────────────────────────────

/// A text run with font metrics and page-local position (top-left origin).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
    pub font: String,
    pub size: f32,
    /// Left edge.
    pub x: f32,
    /// Baseline (bottom of the box).
    pub y: f32,
    pub bbox: BoundingBox,
}

impl Span {
    /// Bold heuristic from the font family name.
    pub fn is_bold(&self) -> bool {
        let f = self.font.to_ascii_lowercase();
        ["bold", "black", "heavy", "semibold", "demi", ",b"]
            .iter()
            .any(|k| f.contains(k))
    }
}

/// Page geometry and raw counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub image_count: usize,
    /// Non-whitespace characters in the embedded text layer.
    pub char_count: usize,
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextOrigin {
    Embedded,
    Ocr,
    Merged,
}

/// Plain text of one page, as extracted and possibly repaired by OCR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    pub page: usize,
    pub text: String,
    pub origin: TextOrigin,
    /// Lines the OCR reconstruction believes are headings.
    pub heading_hints: Vec<String>,
}

/// Vertical extent of a table on its page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableAnchor {
    pub y_top: f32,
    pub y_bottom: f32,
}

/// A validated table ready for placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCandidate {
    /// 1-based, in document order.
    pub number: usize,
    pub page: usize,
    pub rows: Vec<Vec<String>>,
    pub anchor: Option<TableAnchor>,
}

/// An image saved during extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub page: usize,
    /// 1-based sequence across the document.
    pub index: usize,
    /// Where the PNG was written.
    pub path: PathBuf,
    /// Path used in the Markdown link (`./images/imagem_1.png`).
    pub relative_path: String,
    /// `data:image/png;base64,…` when inline links are configured.
    #[serde(skip)]
    pub inline_data: Option<String>,
}

impl ImageRef {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("imagem_{}.png", self.index))
    }

    /// Markdown image link for this image.
    pub fn markdown_link(&self) -> String {
        let target = self.inline_data.as_deref().unwrap_or(&self.relative_path);
        format!("![{}]({})", self.file_name(), target)
    }
}

/// What the OCR stage did, reduced to winners.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrReport {
    pub flagged_pages: Vec<usize>,
    pub pages: Vec<OcrPageSummary>,
}

// ── The context ──────────────────────────────────────────────────────────

/// Shared record for one conversion. Owned by the orchestrator and lent to
/// one stage at a time.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    source_id: String,
    locale: Locale,
    content_kind: ContentKind,

    raw_text: Option<String>,
    spans: Option<Vec<Span>>,
    pages: Option<Vec<PageInfo>>,
    page_texts: Option<Vec<PageText>>,
    scanned: Option<bool>,
    tables: Option<Vec<TableCandidate>>,
    images: Option<Vec<ImageRef>>,
    ocr_report: Option<OcrReport>,
    markdown: Option<String>,
    strategy: Option<String>,
}

macro_rules! context_field {
    ($get:ident, $set:ident, $field:ident, $ty:ty) => {
        pub fn $get(&self) -> Option<&$ty> {
            self.$field.as_ref()
        }

        pub fn $set(&mut self, value: $ty) {
            self.$field = Some(value);
        }
    };
}

impl ConversionContext {
    pub fn new(source_id: impl Into<String>, locale: Locale, content_kind: ContentKind) -> Self {
        Self {
            source_id: source_id.into(),
            locale,
            content_kind,
            raw_text: None,
            spans: None,
            pages: None,
            page_texts: None,
            scanned: None,
            tables: None,
            images: None,
            ocr_report: None,
            markdown: None,
            strategy: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// The kind the pipeline formats for (`Auto` already resolved).
    pub fn content_kind(&self) -> ContentKind {
        self.content_kind.effective()
    }

    context_field!(raw_text, set_raw_text, raw_text, String);
    context_field!(spans, set_spans, spans, Vec<Span>);
    context_field!(pages, set_pages, pages, Vec<PageInfo>);
    context_field!(page_texts, set_page_texts, page_texts, Vec<PageText>);
    context_field!(tables, set_tables, tables, Vec<TableCandidate>);
    context_field!(images, set_images, images, Vec<ImageRef>);
    context_field!(ocr_report, set_ocr_report, ocr_report, OcrReport);
    context_field!(markdown, set_markdown, markdown, String);
    context_field!(strategy, set_strategy, strategy, String);

    pub fn scanned(&self) -> Option<bool> {
        self.scanned
    }

    pub fn set_scanned(&mut self, value: bool) {
        self.scanned = Some(value);
    }

    /// Whether `field` currently holds a value.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Spans => self.spans.is_some(),
            Field::Pages => self.pages.is_some(),
            Field::PageTexts => self.page_texts.is_some(),
            Field::RawText => self.raw_text.is_some(),
            Field::Scanned => self.scanned.is_some(),
            Field::Tables => self.tables.is_some(),
            Field::Images => self.images.is_some(),
            Field::OcrReport => self.ocr_report.is_some(),
            Field::Markdown => self.markdown.is_some(),
            Field::Strategy => self.strategy.is_some(),
        }
    }

    /// Spans of one page, in reading order.
    pub fn page_spans(&self, page: usize) -> impl Iterator<Item = &Span> {
        self.spans
            .iter()
            .flatten()
            .filter(move |s| s.page == page)
    }
}
