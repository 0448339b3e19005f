//! Conversion results: the Markdown artefact plus its diagnostics record.
//!
//! A conversion always produces a [`ConversionOutput`]. Whether the result is
//! good enough is the host's call, made by inspecting [`Diagnostics`]: which
//! stages failed, whether the document was refused as scanned, how many pages
//! went through OCR, and which rewriting strategy won.

use crate::config::{ContentKind, EngineVariant, Locale, RenderVariant};
use serde::{Deserialize, Serialize};

/// The result of converting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// UTF-8 Markdown with LF line endings.
    pub markdown: String,
    pub diagnostics: Diagnostics,
}

impl ConversionOutput {
    /// True when every stage that ran finished without error.
    pub fn is_clean(&self) -> bool {
        self.diagnostics
            .stages
            .iter()
            .all(|s| s.status != StageStatus::Failed)
    }
}

/// Where a run ended up in the orchestrator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Init,
    Running,
    ScannedShortCircuit,
    Completed,
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// The stage ran but had nothing to do (e.g. OCR not needed).
    Skipped,
    Failed,
}

/// One entry of the ordered stage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub name: String,
    /// 1-based position in the pipeline.
    pub order: usize,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub duration_ms: u64,
}

/// How the OCR result for one page was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrUse {
    /// OCR text became the page's base text.
    Replaced,
    /// OCR lines missing from the embedded text were spliced in.
    Merged,
    /// Every attempt failed; embedded text kept unchanged.
    Unchanged,
}

/// The winning OCR attempt for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPageSummary {
    pub page: usize,
    pub attempts: usize,
    pub succeeded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineVariant>,
    pub weighted_score: f64,
    pub mean_confidence: f64,
    pub structural_quality: f64,
    pub used: OcrUse,
}

/// Diagnostics for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub source: String,
    pub locale: Locale,
    pub content_kind: ContentKind,
    pub state: RunState,
    pub stages: Vec<StageOutcome>,
    pub total_duration_ms: u64,
    pub scanned_pdf: bool,
    pub ocr_applied: bool,
    pub ocr_pages_processed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ocr_pages: Vec<OcrPageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_strategy: Option<String>,
    pub tables_placed: usize,
    pub images_extracted: usize,
    pub spelling_corrections: usize,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn new(source: impl Into<String>, locale: Locale, content_kind: ContentKind) -> Self {
        Self {
            source: source.into(),
            locale,
            content_kind,
            ..Self::default()
        }
    }

    /// Stages that finished with [`StageStatus::Failed`].
    pub fn failed_stages(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(|s| s.status == StageStatus::Failed)
    }

    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Document-level metadata returned by [`crate::inspect`], plus the
/// scanned-document assessment the pipeline would make.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    /// Pages carrying a usable embedded text layer.
    pub text_pages: usize,
    /// Pages carrying at least one image object.
    pub image_pages: usize,
    /// Whether conversion would short-circuit as a scanned PDF.
    pub scanned_pdf: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, order: usize, status: StageStatus) -> StageOutcome {
        StageOutcome {
            name: name.into(),
            order,
            status,
            error: None,
            chosen_strategy: None,
            note: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn is_clean_ignores_skipped() {
        let mut d = Diagnostics::new("a.pdf", Locale::En, ContentKind::Article);
        d.stages.push(outcome("extract-text", 1, StageStatus::Completed));
        d.stages.push(outcome("selective-ocr", 2, StageStatus::Skipped));
        let out = ConversionOutput { markdown: String::new(), diagnostics: d };
        assert!(out.is_clean());
    }

    #[test]
    fn failed_stages_are_listed() {
        let mut d = Diagnostics::new("a.pdf", Locale::En, ContentKind::Article);
        d.stages.push(outcome("extract-text", 1, StageStatus::Failed));
        d.stages.push(outcome("assemble", 2, StageStatus::Failed));
        d.stages.push(outcome("cleanup", 3, StageStatus::Completed));
        assert_eq!(d.failed_stages().count(), 2);
        assert_eq!(d.stage("cleanup").map(|s| s.order), Some(3));
    }

    #[test]
    fn diagnostics_serialise_flags() {
        let mut d = Diagnostics::new("scan.pdf", Locale::PtBr, ContentKind::Book);
        d.scanned_pdf = true;
        d.state = RunState::ScannedShortCircuit;
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"scanned_pdf\":true"));
        assert!(json.contains("\"scanned_short_circuit\""));
        assert!(json.contains("\"pt-BR\""));
    }
}
