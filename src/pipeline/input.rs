//! Turning what the caller handed us (a path, a URL, or raw bytes) into a
//! local PDF file the source collaborator can open.
//!
//! ## Why always a file?
//!
//! pdfium opens documents from the file system. Downloads and in-memory
//! buffers are written into a [`TempDir`] owned by the [`ResolvedInput`],
//! so the copy lives exactly as long as the conversion and is removed when
//! the value drops, on success and on failure alike. Every route checks the
//! `%PDF` magic first so a wrong file fails with [`Pdf2MdError::NotAPdf`]
//! instead of an opaque parser error.

use crate::error::Pdf2MdError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";
const FALLBACK_NAME: &str = "document.pdf";

/// A PDF ready to open.
#[derive(Debug)]
pub enum ResolvedInput {
    /// The caller's own file.
    Local(PathBuf),
    /// A copy we wrote; the directory is deleted on drop.
    Temporary { path: PathBuf, _dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(path) => path,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }

    /// Name used as the source id in diagnostics and the scanned advisory.
    pub fn display_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// First four bytes, when they are not the PDF signature.
fn bad_magic(bytes: &[u8]) -> Option<[u8; 4]> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    (&head != PDF_MAGIC).then_some(head)
}

/// Resolve `input` to a local PDF, downloading it when it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2MdError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || (trimmed.contains("://") && !is_url(trimmed)) {
        return Err(Pdf2MdError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(trimmed) {
        download(trimmed, timeout_secs).await
    } else {
        resolve_local(Path::new(trimmed))
    }
}

/// Check that `path` exists, is readable, and starts like a PDF.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2MdError> {
    let path = path.to_path_buf();
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2MdError::FileNotFound { path }),
    };
    let mut head = [0u8; 4];
    if file.read_exact(&mut head).is_ok() {
        if let Some(magic) = bad_magic(&head) {
            return Err(Pdf2MdError::NotAPdf { path, magic });
        }
    }
    debug!(path = %path.display(), "local input resolved");
    Ok(ResolvedInput::Local(path))
}

/// Write `bytes` to a managed temporary file named `name`.
pub fn from_bytes(bytes: &[u8], name: &str) -> Result<ResolvedInput, Pdf2MdError> {
    let dir = TempDir::new().map_err(|e| Pdf2MdError::Internal(e.to_string()))?;
    let path = dir.path().join(sanitize_name(name));
    if let Some(magic) = bad_magic(bytes) {
        return Err(Pdf2MdError::NotAPdf { path, magic });
    }
    std::fs::write(&path, bytes)
        .map_err(|e| Pdf2MdError::Internal(format!("writing temporary PDF: {e}")))?;
    Ok(ResolvedInput::Temporary { path, _dir: dir })
}

async fn download(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2MdError> {
    info!(url, "downloading PDF");
    let failed = |reason: String| Pdf2MdError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let name = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .or_else(|| url_filename(url))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let dir = TempDir::new().map_err(|e| Pdf2MdError::Internal(e.to_string()))?;
    let path = dir.path().join(sanitize_name(&name));
    if let Some(magic) = bad_magic(&bytes) {
        return Err(Pdf2MdError::NotAPdf { path, magic });
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("writing downloaded PDF: {e}")))?;

    info!(path = %path.display(), bytes = bytes.len(), "download complete");
    Ok(ResolvedInput::Temporary { path, _dir: dir })
}

/// `attachment; filename="paper.pdf"` → `paper.pdf`.
fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn url_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

/// Keep only the final path component and make sure it ends in `.pdf`.
fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    if base.to_ascii_lowercase().ends_with(".pdf") {
        base
    } else {
        format!("{base}.pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_recognised() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filenames_from_headers_and_urls() {
        assert_eq!(
            disposition_filename("attachment; filename=\"paper.pdf\""),
            Some("paper.pdf".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
        assert_eq!(
            url_filename("https://example.com/a/b/thesis.pdf?x=1"),
            Some("thesis.pdf".to_string())
        );
        assert_eq!(url_filename("https://example.com/"), None);
        assert_eq!(sanitize_name("../../etc/report"), "report.pdf");
    }

    #[test]
    fn magic_is_checked() {
        assert_eq!(bad_magic(b"%PDF-1.7"), None);
        assert_eq!(bad_magic(b"PK\x03\x04rest"), Some(*b"PK\x03\x04"));
        assert!(matches!(
            from_bytes(b"<html>", "page.html"),
            Err(Pdf2MdError::NotAPdf { .. })
        ));
    }

    #[test]
    fn bytes_land_in_a_temporary_file() {
        let input = from_bytes(b"%PDF-1.4\n%%EOF", "in.pdf").unwrap();
        let path = input.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(input.display_name(), "in.pdf");
        drop(input);
        assert!(!path.exists());
    }

    #[test]
    fn local_files_are_validated() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            resolve_local(&missing),
            Err(Pdf2MdError::FileNotFound { .. })
        ));
        let text = dir.path().join("notes.pdf");
        std::fs::write(&text, "hello").unwrap();
        assert!(matches!(resolve_local(&text), Err(Pdf2MdError::NotAPdf { .. })));
    }

    #[tokio::test]
    async fn other_schemes_are_rejected() {
        assert!(matches!(
            resolve_input("ftp://example.com/a.pdf", 5).await,
            Err(Pdf2MdError::InvalidInput { .. })
        ));
    }
}
