//! Whole-document conversion entry points.
//!
//! ## Why a blocking worker?
//!
//! pdfium and the tesseract child process are blocking, and a conversion is
//! CPU-bound from the first stage to the last. [`convert`] resolves the input
//! on the async runtime (downloads are I/O), then hands the whole pipeline
//! to one `spawn_blocking` worker. A single document is never parallelised;
//! batch callers get concurrency across documents from
//! [`crate::stream::convert_stream`].

use crate::config::ConversionConfig;
use crate::error::Pdf2MdError;
use crate::output::{ConversionOutput, Diagnostics, DocumentMetadata};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::Pipeline;
use crate::source::pdfium::bind_pdfium;
use crate::source::{OcrEngine, PdfiumSource, TesseractEngine};
use std::path::Path;
use tracing::{info, warn};

/// Convert a PDF file or URL to Markdown.
///
/// # Errors
/// Only for fatal problems found before the pipeline starts: missing or
/// unreadable input, a failed download, a file that is not a PDF, an
/// invalid configuration, or no pdfium library. Everything after that is
/// reported in [`ConversionOutput::diagnostics`].
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    let input_str = input_str.as_ref();
    info!(input = input_str, "conversion requested");
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_resolved(resolved, config).await
}

/// Convert PDF bytes held in memory.
///
/// The bytes are written to a managed temporary file that is removed when
/// the conversion finishes, whatever the outcome.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    let resolved = input::from_bytes(bytes, "document.pdf")?;
    convert_resolved(resolved, config).await
}

/// Convert and write the Markdown to `output_path`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a partial
/// file behind.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Diagnostics, Pdf2MdError> {
    let output = convert(input_str, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output.diagnostics)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Read document metadata and the scanned-document assessment without
/// converting anything.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DocumentMetadata, Pdf2MdError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let password = config.password.clone();
    tokio::task::spawn_blocking(move || {
        bind_pdfium()?;
        PdfiumSource::new(resolved.path(), password)
            .metadata()
            .map_err(|e| Pdf2MdError::Internal(e.to_string()))
    })
    .await
    .map_err(|e| Pdf2MdError::Internal(format!("inspect task failed: {e}")))?
}

/// The OCR engine a conversion should use, if OCR is enabled and the
/// executable can be found.
pub fn ocr_engine(config: &ConversionConfig) -> Option<TesseractEngine> {
    if !config.ocr.enabled {
        return None;
    }
    let engine = match &config.ocr.tesseract_path {
        Some(path) => TesseractEngine::with_program(path),
        None => TesseractEngine::default(),
    };
    if engine.is_available() {
        Some(engine)
    } else {
        warn!("tesseract not found; selective OCR disabled for this run");
        None
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) async fn convert_resolved(
    resolved: ResolvedInput,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2MdError> {
    let pipeline = Pipeline::for_config(config)?;
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        // A missing pdfium library is fatal; a broken document is not.
        bind_pdfium()?;
        let source_id = resolved.display_name();
        let source = PdfiumSource::new(resolved.path(), config.password.clone());
        let engine = ocr_engine(&config);
        let output = pipeline.convert(
            &source_id,
            &source,
            engine.as_ref().map(|e| e as &dyn OcrEngine),
            &config,
        );
        drop(resolved);
        Ok(output)
    })
    .await
    .map_err(|e| Pdf2MdError::Internal(format!("conversion task failed: {e}")))?
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2MdError> {
    let failed = |source: std::io::Error| Pdf2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/nested/doc.md");
        write_atomic(&path, "# Title\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\n");
        assert!(!path.with_extension("md.tmp").exists());
    }

    #[test]
    fn disabled_ocr_means_no_engine() {
        let config = ConversionConfig::builder().ocr_enabled(false).build().unwrap();
        assert!(ocr_engine(&config).is_none());
    }

    #[test]
    fn missing_tesseract_is_tolerated() {
        let config = ConversionConfig::builder()
            .tesseract_path("/nonexistent/bin/tesseract")
            .build()
            .unwrap();
        assert!(ocr_engine(&config).is_none());
    }

    #[tokio::test]
    async fn non_pdf_bytes_fail_before_the_pipeline() {
        let err = convert_from_bytes(b"GIF89a....", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = convert("/definitely/not/here.pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::FileNotFound { .. }));
    }
}
