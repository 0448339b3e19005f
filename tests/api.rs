//! Public entry points that fail before any PDF is opened.
//!
//! None of these need pdfium: every input is rejected while it is being
//! resolved.

use futures::StreamExt;
use papermd::{
    convert, convert_from_bytes, convert_stream, convert_to_file, inspect, ConversionConfig,
    Pdf2MdError, Pipeline,
};
use tempfile::TempDir;

#[tokio::test]
async fn bytes_without_pdf_magic_are_rejected() {
    let err = convert_from_bytes(b"<html>not a pdf</html>", &ConversionConfig::default())
        .await
        .unwrap_err();
    match err {
        Pdf2MdError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
        other => panic!("expected NotAPdf, got {other:?}"),
    }
}

#[tokio::test]
async fn local_file_that_is_not_a_pdf() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, "plain text pretending to be a PDF").unwrap();
    let err = convert(path.to_str().unwrap(), &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::NotAPdf { .. }), "{err:?}");
}

#[tokio::test]
async fn missing_file_for_every_entry_point() {
    let config = ConversionConfig::default();
    let missing = "/no/such/dir/paper.pdf";
    assert!(matches!(
        convert(missing, &config).await,
        Err(Pdf2MdError::FileNotFound { .. })
    ));
    assert!(matches!(
        inspect(missing, &config).await,
        Err(Pdf2MdError::FileNotFound { .. })
    ));

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("paper.md");
    assert!(matches!(
        convert_to_file(missing, &out, &config).await,
        Err(Pdf2MdError::FileNotFound { .. })
    ));
    assert!(!out.exists(), "no output is written for a fatal error");
}

#[tokio::test]
async fn unsupported_scheme_is_invalid_input() {
    let err = convert("ftp://example.com/paper.pdf", &ConversionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::InvalidInput { .. }));
}

#[tokio::test]
async fn batch_reports_each_document() {
    let config = ConversionConfig::builder().concurrency(3).build().unwrap();
    let inputs = ["/no/a.pdf", "/no/b.pdf", "/no/c.pdf", "/no/d.pdf"];
    let results: Vec<_> = convert_stream(inputs, &config).collect().await;

    assert_eq!(results.len(), inputs.len());
    let mut seen: Vec<&str> = results.iter().map(|(input, _)| input.as_str()).collect();
    seen.sort_unstable();
    assert_eq!(seen, inputs);
    assert!(results.iter().all(|(_, r)| r.is_err()));
}

#[test]
fn pipeline_identity_is_validated() {
    assert!(Pipeline::configure("en", "article").is_ok());
    assert!(Pipeline::configure("pt-BR", "book").is_ok());
    assert!(matches!(
        Pipeline::configure("de", "article"),
        Err(Pdf2MdError::InvalidConfig(_))
    ));
    assert!(matches!(
        Pipeline::configure("en", "newsletter"),
        Err(Pdf2MdError::InvalidConfig(_))
    ));
}

#[test]
fn builder_rejects_zero_concurrency() {
    let err = ConversionConfig::builder().concurrency(0).build().unwrap_err();
    assert!(matches!(err, Pdf2MdError::InvalidConfig(_)));
}
