//! Error types for the papermd library.
//!
//! Four error types reflect four distinct failure scopes:
//!
//! * [`Pdf2MdError`]: **Fatal**: the conversion cannot even start (input
//!   file missing, URL download failed, invalid configuration). Returned as
//!   `Err(Pdf2MdError)` from the top-level `convert*` functions.
//!
//! * [`StageError`]: **Non-fatal**: one pipeline stage failed. The
//!   orchestrator records it in [`crate::output::Diagnostics`] and keeps
//!   going; the Markdown is simply poorer for it.
//!
//! * [`OcrError`]: one OCR attempt failed. Local to the OCR stage and
//!   ignored during attempt selection.
//!
//! * [`StrategyError`]: one rewriting strategy failed. The strategy is
//!   dropped from arbitration.
//!
//! Once the pipeline is running, nothing propagates to the caller as an
//! error: a host inspects the diagnostics to decide whether to accept the
//! result.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the papermd library.
///
/// Stage-level failures use [`StageError`] and are stored in
/// [`crate::output::StageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Unrecognised locale or content kind, or a builder constraint failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of a single pipeline stage.
///
/// Serialisable so it can travel inside the diagnostics record.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// A field the stage reads was never written, usually because the stage
    /// that produces it failed earlier.
    #[error("stage '{stage}' needs '{field}', which no earlier stage produced")]
    MissingField { stage: String, field: String },

    /// The PDF collaborator failed (corrupt file, unreadable bytes).
    #[error("source error: {0}")]
    Source(String),

    /// The OCR stage failed as a whole (individual attempts never get here).
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Filesystem error while saving stage artefacts (images).
    #[error("I/O error: {0}")]
    Io(String),

    /// The stage panicked; the orchestrator caught it.
    #[error("stage panicked: {0}")]
    Panicked(String),

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        StageError::Io(e.to_string())
    }
}

/// Failure of one OCR attempt (render or recognise).
#[derive(Debug, Error)]
pub enum OcrError {
    /// The page could not be rendered at the requested zoom.
    #[error("page {page}: render at zoom {zoom} failed: {detail}")]
    Render { page: usize, zoom: f32, detail: String },

    /// The engine executable could not be started.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but exited unsuccessfully.
    #[error("OCR engine failed (exit {code:?}): {stderr}")]
    EngineFailed { code: Option<i32>, stderr: String },

    /// The engine output could not be parsed.
    #[error("malformed OCR output: {0}")]
    Malformed(String),

    /// Temp-file handling around the attempt failed.
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the rendered bitmap failed.
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Failure of one rewriting strategy during arbitration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    /// The strategy produced nothing usable from a non-empty input.
    #[error("strategy '{strategy}' produced empty output")]
    EmptyOutput { strategy: &'static str },

    /// The strategy rejected the input.
    #[error("strategy '{strategy}' rejected input: {reason}")]
    Rejected {
        strategy: &'static str,
        reason: String,
    },
}
