//! Collaborator interfaces: where text, images, and OCR come from.
//!
//! The pipeline never touches a PDF library or an OCR binary directly. It
//! talks to a [`PdfSource`] (page layouts, images, table candidates,
//! rendering) and an optional [`OcrEngine`]. Production code plugs in
//! [`PdfiumSource`] and [`TesseractEngine`]; tests and in-memory callers use
//! [`MemorySource`].
//!
//! ## Coordinates
//!
//! All geometry is page-local in PDF points with the origin at the **top-left**
//! corner and `y` growing downwards, so sorting by `(y, x)` gives reading
//! order. Implementations over bottom-left-origin libraries flip `y`.

pub mod memory;
pub mod ocr;
pub mod pdfium;
pub mod tesseract;

pub use memory::{MemorySource, MemorySpan};
pub use ocr::{OcrEngine, OcrOutput, OcrParams, OcrToken};
pub use pdfium::PdfiumSource;
pub use tesseract::TesseractEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a [`PdfSource`].
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The document could not be opened (corrupt, encrypted, unreadable).
    #[error("cannot open document: {0}")]
    Open(String),

    /// A page-level operation failed.
    #[error("page {page}: {detail}")]
    Page { page: usize, detail: String },

    /// The page index is outside the document.
    #[error("page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: usize, total: usize },
}

/// Axis-aligned rectangle in page-local points (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// A text run as reported by the PDF library.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpan {
    pub text: String,
    pub font: String,
    pub size: f32,
    pub bbox: BoundingBox,
}

/// A line of spans as grouped by the PDF library.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLine {
    pub spans: Vec<SourceSpan>,
}

/// A block of lines as grouped by the PDF library.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBlock {
    pub lines: Vec<SourceLine>,
}

/// Text layout of one page: blocks → lines → spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    /// 1-based page number.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<SourceBlock>,
    /// Number of image objects on the page (used by scanned detection).
    pub image_count: usize,
}

impl PageLayout {
    /// Count of non-whitespace characters across all spans.
    pub fn char_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| &b.lines)
            .flat_map(|l| &l.spans)
            .map(|s| s.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// A decoded image found on a page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: usize,
    /// 0-based index of the image on its page.
    pub index: usize,
    pub image: DynamicImage,
}

/// A table candidate offered by the PDF library.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub page: usize,
    pub rows: Vec<Vec<String>>,
    /// Vertical extent on the page, when known.
    pub bbox: Option<BoundingBox>,
}

/// The PDF collaborator.
///
/// Every method is called at most once per stage and may be slow (each call
/// is free to reopen the document). Errors become stage failures; they never
/// abort the conversion.
pub trait PdfSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> Result<usize, SourceError>;

    /// Text layout of every page, in page order.
    fn pages(&self) -> Result<Vec<PageLayout>, SourceError>;

    /// Plain-text fallback for one page (1-based), used when the layout of a
    /// page came back empty.
    fn plain_text(&self, page: usize) -> Result<String, SourceError>;

    /// Images embedded in the document, in page order.
    fn images(&self) -> Result<Vec<PageImage>, SourceError>;

    /// Table candidates detected by the PDF library. Default: none.
    fn table_candidates(&self) -> Result<Vec<RawTable>, SourceError> {
        Ok(Vec::new())
    }

    /// Rasterise one page (1-based) at `zoom` × 72 DPI.
    fn render_page(&self, page: usize, zoom: f32) -> Result<DynamicImage, SourceError>;
}
