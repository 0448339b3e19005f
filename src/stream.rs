//! Batch conversion: many documents, results as each one finishes.
//!
//! ## Why stream?
//!
//! Converting a directory of papers takes minutes. [`convert_stream`] yields
//! one `(input, result)` pair per document as soon as that document is done,
//! so callers can write files, update a progress bar, or stop early instead
//! of waiting for the slowest document.
//!
//! Documents run on blocking workers, at most `config.concurrency` at a time.
//! Results arrive in completion order, not input order. Each document is
//! still converted by a single worker; concurrency is only ever across
//! documents.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::Pdf2MdError;
use crate::output::ConversionOutput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// One finished document: the input as given, and its outcome.
pub type BatchItem = (String, Result<ConversionOutput, Pdf2MdError>);

/// A boxed stream of finished documents.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Convert every input (path or URL), yielding results as they complete.
///
/// A failing document never stops the batch; its error is yielded next to
/// its input.
pub fn convert_stream<I, S>(inputs: I, config: &ConversionConfig) -> BatchStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
    let concurrency = config.concurrency.max(1);
    info!(documents = inputs.len(), concurrency, "batch conversion started");

    let config = config.clone();
    let s = stream::iter(inputs.into_iter().map(move |input| {
        let cfg = config.clone();
        async move {
            let result = convert(&input, &cfg).await;
            (input, result)
        }
    }))
    .buffer_unordered(concurrency);
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_input_yields_one_result() {
        let config = ConversionConfig::builder().concurrency(2).build().unwrap();
        let inputs = vec!["/no/such/a.pdf", "/no/such/b.pdf", "ftp://example.com/c.pdf"];
        let mut results: Vec<BatchItem> = convert_stream(inputs, &config).collect().await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].1, Err(Pdf2MdError::FileNotFound { .. })));
        assert!(matches!(results[1].1, Err(Pdf2MdError::FileNotFound { .. })));
        assert!(matches!(results[2].1, Err(Pdf2MdError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn empty_batch_is_an_empty_stream() {
        let results: Vec<BatchItem> =
            convert_stream(Vec::<String>::new(), &ConversionConfig::default())
                .collect()
                .await;
        assert!(results.is_empty());
    }
}
