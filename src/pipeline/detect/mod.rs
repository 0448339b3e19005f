//! Structural detectors: read-rewrite passes over Markdown lines.
//!
//! Each detector implements [`MarkdownRewrite`] and is wrapped in a
//! [`RewriteStage`] to join the pipeline. Detectors keep no state between
//! runs and are idempotent: feeding a detector its own output changes
//! nothing.

pub mod citations;
pub mod code;
pub mod footnotes;
pub mod headers;
pub mod lists;
pub mod quotes;

use super::context::{ConversionContext, Field};
use super::{require, Stage, StageEnv, StageReport};
use crate::error::StageError;
use crate::lexicon::{lexicon, Lexicon};
use tracing::debug;

/// Output of one rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    /// Number of edits made (lines rewritten, items converted, …).
    pub changes: usize,
}

impl Rewritten {
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            changes: 0,
        }
    }
}

/// A pure Markdown-to-Markdown rewrite.
pub trait MarkdownRewrite: Send + Sync {
    /// Stage name used in diagnostics.
    fn name(&self) -> &'static str;

    fn rewrite(&self, markdown: &str, lex: &Lexicon) -> Rewritten;
}

/// Adapts a [`MarkdownRewrite`] to the [`Stage`] interface.
pub struct RewriteStage<R> {
    rule: R,
}

impl<R: MarkdownRewrite> RewriteStage<R> {
    pub fn new(rule: R) -> Self {
        Self { rule }
    }
}

impl<R: MarkdownRewrite> Stage for RewriteStage<R> {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        _env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let markdown = require(ctx.markdown(), self.name(), Field::Markdown)?;
        let out = self.rule.rewrite(markdown, lexicon(ctx.locale()));
        debug!(stage = self.name(), changes = out.changes, "rewrite applied");
        let changes = out.changes;
        ctx.set_markdown(out.text);
        Ok(StageReport::done().with_note(format!("{changes} changes")))
    }
}

// ── Line helpers shared by the detectors ─────────────────────────────────

pub(crate) fn is_heading(line: &str) -> bool {
    let t = line.trim_start();
    let hashes = t.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && t[hashes..].starts_with(' ')
}

/// `"## Results"` → `Some((2, "Results"))`.
pub(crate) fn heading_parts(line: &str) -> Option<(usize, &str)> {
    if !is_heading(line) {
        return None;
    }
    let t = line.trim_start();
    let hashes = t.chars().take_while(|c| *c == '#').count();
    Some((hashes, t[hashes..].trim()))
}

pub(crate) fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

pub(crate) fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// For each line, whether it sits inside (or delimits) a fenced code block.
pub(crate) fn fenced_mask(lines: &[&str]) -> Vec<bool> {
    let mut inside = false;
    lines
        .iter()
        .map(|l| {
            if is_fence(l) {
                inside = !inside;
                true
            } else {
                inside
            }
        })
        .collect()
}
