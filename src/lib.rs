//! # papermd
//!
//! Convert textual PDF papers and books to structured Markdown, falling back
//! to OCR only on the pages whose embedded text is unreliable.
//!
//! ## Why this crate?
//!
//! Plain extractors (pdftotext, pdf-extract) hand back a wall of lines:
//! headings are indistinguishable from body text, hyphenated words stay
//! split, running headers repeat on every page, and a page whose text layer
//! is garbage stays garbage. This crate reads the embedded text with its
//! font geometry, classifies each line (title, section, subsection, body)
//! from size, position and locale vocabulary, repairs the text, OCRs only
//! the pages that need it, and rebuilds the document structure: lists,
//! quotes, code, footnotes, citations, tables and images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, download URL, or spill bytes to a temp file
//!  ├─ 2. Extract   text spans, tables, images (pdfium, spawn_blocking)
//!  │               └─ image-only document? ─▶ advisory Markdown, stop
//!  ├─ 3. OCR       tesseract on low-quality pages only, best attempt wins
//!  ├─ 4. Assemble  classify lines, fuse paragraphs, pick a rewriting strategy
//!  ├─ 5. Detect    lists, quotes, code, footnotes, citations, page furniture
//!  └─ 6. Output    spell-checked Markdown + diagnostics
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use papermd::{convert, ConversionConfig, Locale};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().locale(Locale::PtBr).build()?;
//!     let output = convert("dissertacao.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     for stage in output.diagnostics.failed_stages() {
//!         eprintln!("{} failed: {:?}", stage.name, stage.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Callers that already hold text, or want to test without pdfium, drive a
//! [`Pipeline`] directly with a [`MemorySource`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `papermd` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! papermd = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod lexicon;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod stream;
pub mod text;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ContentKind, ConversionConfig, ConversionConfigBuilder, ImageLinkStyle, Locale, OcrSettings,
};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_file, inspect};
pub use error::{OcrError, Pdf2MdError, StageError, StrategyError};
pub use output::{ConversionOutput, Diagnostics, DocumentMetadata, RunState, StageStatus};
pub use pipeline::Pipeline;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{MemorySource, OcrEngine, PdfSource, PdfiumSource, TesseractEngine};
pub use stream::convert_stream;
