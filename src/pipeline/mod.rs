//! The staged conversion pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s that share one
//! [`ConversionContext`]. Each stage reads the fields it needs, writes the
//! fields it derives, and reports a [`StageReport`]. A failing (or
//! panicking) stage is recorded and the next stage runs anyway.
//!
//! ## Data Flow
//!
//! ```text
//! common pool        extract-text ─▶ extract-tables ─▶ extract-images
//!                         │ (scanned? ─▶ advisory, stop)
//! language pool      selective-ocr
//! content pool       assemble ─▶ rewrite ─▶ cleanup ─▶ place-tables
//!                    ─▶ lists ─▶ quotes ─▶ code ─▶ footnotes ─▶ citations
//!                    ─▶ header-filter ─▶ spell-check
//! ```
//!
//! ## Why declared read/write sets?
//!
//! Stages never look fields up by string. Each advertises the [`Field`]s it
//! reads and writes, so [`Pipeline::new`] can reject an ordering where a
//! stage reads something no earlier stage produces. At run time a read whose
//! producer failed becomes a [`StageError::MissingField`] for the reader.

pub mod assemble;
pub mod classify;
pub mod context;
pub mod detect;
pub mod extract;
pub mod fusion;
pub mod images;
pub mod input;
pub mod layout;
pub mod ocr;
pub mod postprocess;
pub mod spellcheck;
pub mod strategies;
pub mod tables;

use crate::config::{ContentKind, ConversionConfig, Locale};
use crate::error::{Pdf2MdError, StageError};
use crate::output::{ConversionOutput, Diagnostics, OcrUse, RunState, StageOutcome, StageStatus};
use crate::source::{OcrEngine, PdfSource};
use context::{ConversionContext, Field};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Stage capability ─────────────────────────────────────────────────────

/// Collaborators and configuration lent to every stage.
pub struct StageEnv<'a> {
    pub config: &'a ConversionConfig,
    pub source: &'a dyn PdfSource,
    pub ocr: Option<&'a dyn OcrEngine>,
}

/// Counters a stage hands back for the diagnostics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TablesPlaced,
    ImagesExtracted,
    SpellingCorrections,
}

/// What a stage reports besides its context writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReport {
    /// The stage had nothing to do.
    pub skipped: bool,
    pub strategy: Option<String>,
    pub note: Option<String>,
    pub metrics: Vec<(Metric, usize)>,
}

impl StageReport {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            skipped: true,
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_metric(mut self, metric: Metric, value: usize) -> Self {
        self.metrics.push((metric, value));
        self
    }
}

/// One pipeline step.
pub trait Stage: Send + Sync {
    /// Stable kebab-case name used in diagnostics and logs.
    fn name(&self) -> &'static str;

    /// Fields that must be present before the stage runs.
    fn reads(&self) -> &'static [Field];

    /// Fields the stage may write.
    fn writes(&self) -> &'static [Field];

    fn run(&self, ctx: &mut ConversionContext, env: &StageEnv<'_>)
        -> Result<StageReport, StageError>;
}

/// Fetch a required field or fail with [`StageError::MissingField`].
pub(crate) fn require<'c, T>(
    value: Option<&'c T>,
    stage: &str,
    field: Field,
) -> Result<&'c T, StageError> {
    value.ok_or_else(|| StageError::MissingField {
        stage: stage.to_string(),
        field: field.to_string(),
    })
}

// ── Stage pools ──────────────────────────────────────────────────────────

/// Source acquisition. The first stage doubles as the scanned-PDF gate.
fn common_pool() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(extract::ExtractText),
        Box::new(tables::ExtractTables),
        Box::new(images::ExtractImages),
    ]
}

/// Locale-tuned extraction.
fn language_pool(locale: Locale) -> Vec<Box<dyn Stage>> {
    vec![Box::new(ocr::SelectiveOcr::new(locale))]
}

/// Article or book formatting.
fn content_pool(kind: ContentKind) -> Vec<Box<dyn Stage>> {
    let kind = kind.effective();
    vec![
        Box::new(assemble::Assemble::new(kind)),
        Box::new(strategies::Rewrite),
        Box::new(detect::RewriteStage::new(postprocess::Cleanup)),
        Box::new(tables::PlaceTables),
        Box::new(detect::RewriteStage::new(detect::lists::Lists)),
        Box::new(detect::RewriteStage::new(detect::quotes::Quotes)),
        Box::new(detect::RewriteStage::new(detect::code::Code)),
        Box::new(detect::RewriteStage::new(detect::footnotes::Footnotes)),
        Box::new(detect::RewriteStage::new(detect::citations::Citations)),
        Box::new(detect::RewriteStage::new(detect::headers::HeaderFilter::for_kind(kind))),
        Box::new(spellcheck::SpellCheck),
    ]
}

/// The ordered stage list for a locale and content kind.
pub fn standard_stages(locale: Locale, kind: ContentKind) -> Vec<Box<dyn Stage>> {
    let mut stages = common_pool();
    stages.extend(language_pool(locale));
    stages.extend(content_pool(kind));
    stages
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Markdown emitted instead of a conversion when the document is image-only.
pub fn scanned_advisory(source_id: &str) -> String {
    format!(
        "# Scanned PDF not converted\n\n\
         The document `{source_id}` appears to be a scanned PDF: its pages are images \
         without a usable embedded text layer.\n\n\
         OCR-only documents are not converted. Run the file through an OCR tool that \
         adds a text layer, then convert the result."
    )
}

/// An ordered, validated list of stages for one locale and content kind.
pub struct Pipeline {
    locale: Locale,
    content_kind: ContentKind,
    stages: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("locale", &self.locale)
            .field("content_kind", &self.content_kind)
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Build the standard pipeline from textual identity values.
    ///
    /// # Errors
    /// [`Pdf2MdError::InvalidConfig`] for an unknown locale or content kind.
    pub fn configure(locale: &str, content_kind: &str) -> Result<Self, Pdf2MdError> {
        let locale: Locale = locale.parse()?;
        let kind: ContentKind = content_kind.parse()?;
        Self::new(locale, kind, standard_stages(locale, kind))
    }

    /// Build the standard pipeline for a configuration.
    pub fn for_config(config: &ConversionConfig) -> Result<Self, Pdf2MdError> {
        Self::new(
            config.locale,
            config.content_kind,
            standard_stages(config.locale, config.content_kind),
        )
    }

    /// Build a pipeline from an explicit stage list, checking that every
    /// field a stage reads is written by an earlier stage.
    pub fn new(
        locale: Locale,
        content_kind: ContentKind,
        stages: Vec<Box<dyn Stage>>,
    ) -> Result<Self, Pdf2MdError> {
        let mut produced: HashSet<Field> = HashSet::new();
        let mut names: HashSet<&'static str> = HashSet::new();
        for stage in &stages {
            if !names.insert(stage.name()) {
                return Err(Pdf2MdError::InvalidConfig(format!(
                    "stage '{}' appears twice",
                    stage.name()
                )));
            }
            if let Some(missing) = stage.reads().iter().find(|f| !produced.contains(*f)) {
                return Err(Pdf2MdError::InvalidConfig(format!(
                    "stage '{}' reads '{}', which no earlier stage writes",
                    stage.name(),
                    missing
                )));
            }
            produced.extend(stage.writes().iter().copied());
        }
        Ok(Self {
            locale,
            content_kind,
            stages,
        })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage over `source` and return the Markdown artefact.
    ///
    /// Never fails: stage errors and panics land in the diagnostics. Blocking;
    /// async callers go through [`crate::convert`].
    pub fn convert(
        &self,
        source_id: &str,
        source: &dyn PdfSource,
        ocr: Option<&dyn OcrEngine>,
        config: &ConversionConfig,
    ) -> ConversionOutput {
        let started = Instant::now();
        let total = self.stages.len();
        let callback = config.progress_callback.as_ref();
        let env = StageEnv {
            config,
            source,
            ocr,
        };

        let mut ctx = ConversionContext::new(source_id, self.locale, self.content_kind);
        let mut diag = Diagnostics::new(source_id, self.locale, self.content_kind);

        info!(
            source = source_id,
            locale = %self.locale,
            kind = %self.content_kind,
            stages = total,
            "conversion started"
        );
        if let Some(cb) = callback {
            cb.on_conversion_start(total);
        }
        diag.state = RunState::Running;

        let mut run = 0usize;
        let mut succeeded = 0usize;

        for (idx, stage) in self.stages.iter().enumerate() {
            let order = idx + 1;
            let name = stage.name();
            if let Some(cb) = callback {
                cb.on_stage_start(name, order, total);
            }
            debug!(stage = name, order, "stage started");

            let stage_start = Instant::now();
            let result = match stage.reads().iter().find(|f| !ctx.has(**f)) {
                Some(missing) => Err(StageError::MissingField {
                    stage: name.to_string(),
                    field: missing.to_string(),
                }),
                None => catch_unwind(AssertUnwindSafe(|| stage.run(&mut ctx, &env)))
                    .unwrap_or_else(|payload| Err(StageError::Panicked(panic_message(payload)))),
            };
            let duration_ms = stage_start.elapsed().as_millis() as u64;
            run += 1;

            let outcome = match result {
                Ok(report) => {
                    succeeded += 1;
                    for (metric, value) in &report.metrics {
                        match metric {
                            Metric::TablesPlaced => diag.tables_placed += value,
                            Metric::ImagesExtracted => diag.images_extracted += value,
                            Metric::SpellingCorrections => diag.spelling_corrections += value,
                        }
                    }
                    if let Some(cb) = callback {
                        cb.on_stage_complete(name, order, total);
                    }
                    info!(
                        stage = name,
                        order,
                        duration_ms,
                        skipped = report.skipped,
                        note = report.note.as_deref().unwrap_or(""),
                        "stage finished"
                    );
                    StageOutcome {
                        name: name.to_string(),
                        order,
                        status: if report.skipped {
                            StageStatus::Skipped
                        } else {
                            StageStatus::Completed
                        },
                        error: None,
                        chosen_strategy: report.strategy,
                        note: report.note,
                        duration_ms,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(stage = name, order, error = %message, "stage failed; continuing");
                    if let Some(cb) = callback {
                        cb.on_stage_error(name, order, total, &message);
                    }
                    diag.errors.push(format!("{name}: {message}"));
                    StageOutcome {
                        name: name.to_string(),
                        order,
                        status: StageStatus::Failed,
                        error: Some(message),
                        chosen_strategy: None,
                        note: None,
                        duration_ms,
                    }
                }
            };
            diag.stages.push(outcome);

            if order == 1 && ctx.scanned() == Some(true) {
                info!(source = source_id, "scanned PDF detected; emitting advisory");
                diag.state = RunState::ScannedShortCircuit;
                diag.scanned_pdf = true;
                break;
            }
        }

        let markdown = if diag.state == RunState::ScannedShortCircuit {
            scanned_advisory(source_id)
        } else {
            diag.state = RunState::Completed;
            finalize_markdown(ctx.markdown().map(String::as_str).unwrap_or_default())
        };

        if let Some(report) = ctx.ocr_report() {
            diag.ocr_pages_processed = report.pages.len();
            diag.ocr_applied = report.pages.iter().any(|p| p.used != OcrUse::Unchanged);
            diag.ocr_pages = report.pages.clone();
        }
        diag.chosen_strategy = ctx.strategy().cloned();
        diag.total_duration_ms = started.elapsed().as_millis() as u64;

        if let Some(cb) = callback {
            cb.on_conversion_complete(run, succeeded);
        }
        info!(
            source = source_id,
            duration_ms = diag.total_duration_ms,
            stages_run = run,
            stages_failed = run - succeeded,
            bytes = markdown.len(),
            "conversion finished"
        );

        ConversionOutput {
            markdown,
            diagnostics: diag,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Last-mile invariants: LF only, no control characters, no trailing
/// spaces, at most one blank line in a row, no leading or trailing blank
/// lines.
pub fn finalize_markdown(markdown: &str) -> String {
    let text = crate::text::strip_control(&crate::text::normalize_newlines(markdown));
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    let mut in_fence = false;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if line.is_empty() && !in_fence {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    struct Writes(&'static str, &'static [Field], &'static [Field]);

    impl Stage for Writes {
        fn name(&self) -> &'static str {
            self.0
        }
        fn reads(&self) -> &'static [Field] {
            self.1
        }
        fn writes(&self) -> &'static [Field] {
            self.2
        }
        fn run(
            &self,
            ctx: &mut ConversionContext,
            _env: &StageEnv<'_>,
        ) -> Result<StageReport, StageError> {
            if self.2.contains(&Field::Markdown) {
                let prev = ctx.markdown().cloned().unwrap_or_default();
                ctx.set_markdown(format!("{prev}{}\n", self.0));
            }
            Ok(StageReport::done())
        }
    }

    struct Panics;

    impl Stage for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }
        fn reads(&self) -> &'static [Field] {
            &[]
        }
        fn writes(&self) -> &'static [Field] {
            &[]
        }
        fn run(
            &self,
            _ctx: &mut ConversionContext,
            _env: &StageEnv<'_>,
        ) -> Result<StageReport, StageError> {
            panic!("boom")
        }
    }

    #[test]
    fn configure_rejects_unknown_identity() {
        assert!(matches!(
            Pipeline::configure("fr", "article"),
            Err(Pdf2MdError::InvalidConfig(_))
        ));
        assert!(matches!(
            Pipeline::configure("en", "magazine"),
            Err(Pdf2MdError::InvalidConfig(_))
        ));
    }

    #[test]
    fn standard_order_is_leaves_first() {
        let p = Pipeline::configure("pt-BR", "auto").unwrap();
        assert_eq!(
            p.stage_names(),
            vec![
                "extract-text",
                "extract-tables",
                "extract-images",
                "selective-ocr",
                "assemble",
                "rewrite",
                "cleanup",
                "place-tables",
                "lists",
                "quotes",
                "code",
                "footnotes",
                "citations",
                "header-filter",
                "spell-check",
            ]
        );
    }

    #[test]
    fn new_rejects_read_before_write() {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(Writes("b", &[Field::Markdown], &[Field::Markdown])),
            Box::new(Writes("a", &[], &[Field::Markdown])),
        ];
        assert!(Pipeline::new(Locale::En, ContentKind::Article, stages).is_err());
    }

    #[test]
    fn panicking_stage_is_recorded_and_pipeline_continues() {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(Writes("first", &[], &[Field::Markdown])),
            Box::new(Panics),
            Box::new(Writes("last", &[Field::Markdown], &[Field::Markdown])),
        ];
        let p = Pipeline::new(Locale::En, ContentKind::Article, stages).unwrap();
        let src = MemorySource::from_text("");
        let out = p.convert("t", &src, None, &ConversionConfig::default());
        assert_eq!(out.markdown, "first\nlast");
        assert_eq!(out.diagnostics.stages.len(), 3);
        assert_eq!(out.diagnostics.stages[1].status, StageStatus::Failed);
        assert!(out.diagnostics.stages[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("boom")));
        assert_eq!(out.diagnostics.state, RunState::Completed);
    }

    #[test]
    fn finalize_collapses_blank_runs_and_trims() {
        assert_eq!(
            finalize_markdown("\n\n# T  \r\n\n\n\npara\u{0007}\n\n"),
            "# T\n\npara"
        );
    }
}
