//! First-pass Markdown assembly from classified lines.
//!
//! Embedded pages are rebuilt from spans (lines and blocks by position, font
//! evidence for the classifier); OCR pages are rebuilt from their text, with
//! the reconstruction's heading hints standing in for font evidence. Titles
//! become `#` headings on their own block, other lines stay one per line
//! inside their block, and blocks are separated by a blank line. Paragraph
//! fusion happens later, after strategy arbitration.
//!
//! Lines inside a table's vertical extent are left out (the table is placed
//! separately), as are running headers and footers identifiable by position.
//! Image links close the page they were found on.

use super::classify::{list_marker, Classifier, DocStats, Fragment, ListMarker, Role};
use super::context::{
    ConversionContext, Field, ImageRef, PageInfo, PageText, Span, TableAnchor, TableCandidate,
    TextOrigin,
};
use super::layout::{self, Line};
use super::{require, Stage, StageEnv, StageReport};
use crate::config::ContentKind;
use crate::error::StageError;
use crate::lexicon::Lexicon;
use tracing::debug;

/// Top band (fraction of page height) where running headers live.
const HEADER_BAND: f32 = 0.06;
/// Bottom band where running footers live.
const FOOTER_BAND: f32 = 0.94;
/// Indentation (in spaces) below which a line is treated as flush.
const MIN_INDENT: usize = 2;

/// Builds the first-pass Markdown.
pub struct Assemble {
    kind: ContentKind,
}

impl Assemble {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind: kind.effective(),
        }
    }
}

/// Font statistics over all spans.
pub fn doc_stats(spans: &[Span]) -> DocStats {
    let median_size = layout::median_font_size(spans).unwrap_or(0.0);
    let title_size = spans
        .iter()
        .filter(|s| s.page == 1 && !s.text.trim().is_empty())
        .map(|s| s.size)
        .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));
    DocStats {
        median_size,
        title_size,
    }
}

/// Whether line `i` of a block belongs to a list: bullets always do;
/// numbered and lettered lines do when another line of the block also
/// carries a marker and the line is not a known section heading.
fn in_list(texts: &[&str], i: usize, lex: &Lexicon) -> bool {
    match list_marker(texts[i]) {
        Some((ListMarker::Bullet, _)) => true,
        Some(_) => {
            let others = texts
                .iter()
                .enumerate()
                .any(|(j, t)| j != i && list_marker(t).is_some());
            others && !lex.is_section_name(texts[i])
        }
        None => false,
    }
}

fn inside_table(line: &Line, anchors: &[TableAnchor]) -> bool {
    let mid = (line.top + line.bottom) / 2.0;
    anchors
        .iter()
        .any(|a| mid >= a.y_top - 1.0 && mid <= a.y_bottom + 1.0)
}

fn is_running_furniture(line: &Line, height: f32, lex: &Lexicon) -> bool {
    if height <= 0.0 {
        return false;
    }
    let in_band = line.top / height < HEADER_BAND || line.bottom / height > FOOTER_BAND;
    in_band
        && (line.text.chars().any(|c| c.is_ascii_digit()) || lex.contains_header_phrase(&line.text))
}

/// Accumulates blocks for one document.
struct Assembler<'a> {
    classifier: &'a Classifier,
    blocks: Vec<String>,
    paragraph: Vec<String>,
    titles: usize,
    dropped: usize,
}

impl Assembler<'_> {
    fn flush(&mut self) {
        if !self.paragraph.is_empty() {
            self.blocks.push(self.paragraph.join("\n"));
            self.paragraph.clear();
        }
    }

    /// Classify and emit one line. `indent` is the leading space count to keep.
    fn emit(&mut self, frag: &Fragment<'_>, indent: usize) {
        let decision = self.classifier.classify(frag);
        match decision.role {
            Role::Title { level } => {
                self.flush();
                self.titles += 1;
                self.blocks
                    .push(format!("{} {}", "#".repeat(level as usize), decision.text));
            }
            Role::Paragraph => {
                self.paragraph
                    .push(format!("{}{}", " ".repeat(indent), decision.text));
            }
            Role::Dropped => self.dropped += 1,
        }
    }

    fn layout_page(&mut self, page: &PageInfo, spans: &[&Span], anchors: &[TableAnchor]) {
        let lex = self.classifier.lexicon();
        let lines: Vec<Line> = layout::lines_from_spans(spans)
            .into_iter()
            .filter(|l| !inside_table(l, anchors))
            .filter(|l| !is_running_furniture(l, page.height, lex))
            .collect();
        let margin = lines.iter().map(|l| l.x).fold(f32::MAX, f32::min);

        for block in layout::blocks(lines) {
            let indents: Vec<usize> = block
                .iter()
                .map(|l| ((l.x - margin) / (l.size.max(1.0) * 0.5)).round().max(0.0) as usize)
                .collect();
            let all_indented = indents.iter().all(|i| *i >= MIN_INDENT);
            let texts: Vec<&str> = block.iter().map(|l| l.text.as_str()).collect();
            for (i, line) in block.iter().enumerate() {
                let listed = in_list(&texts, i, lex);
                let keep_indent = indents[i] >= MIN_INDENT
                    && (all_indented || list_marker(&line.text).is_some());
                let frag = Fragment {
                    text: &line.text,
                    page: page.number,
                    size: line.size,
                    bold: line.bold,
                    y_rel: (page.height > 0.0).then(|| line.top / page.height),
                    heading_hint: false,
                    in_list: listed,
                    in_table: false,
                };
                self.emit(&frag, if keep_indent { indents[i] } else { 0 });
            }
            self.flush();
        }
    }

    fn text_page(&mut self, page: &PageText) {
        let lex = self.classifier.lexicon();
        for block in page.text.split("\n\n") {
            let texts: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
            for (i, text) in texts.iter().enumerate() {
                let hinted = page.heading_hints.iter().any(|h| h.trim() == text.trim());
                let frag = Fragment {
                    text,
                    page: page.page,
                    heading_hint: hinted,
                    in_list: in_list(&texts, i, lex),
                    ..Fragment::default()
                };
                self.emit(&frag, 0);
            }
            self.flush();
        }
    }
}

impl Stage for Assemble {
    fn name(&self) -> &'static str {
        "assemble"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Spans, Field::Pages, Field::PageTexts]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        _env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let spans = require(ctx.spans(), self.name(), Field::Spans)?;
        let pages = require(ctx.pages(), self.name(), Field::Pages)?;
        let page_texts = require(ctx.page_texts(), self.name(), Field::PageTexts)?;
        let tables: &[TableCandidate] = ctx.tables().map(Vec::as_slice).unwrap_or(&[]);
        let images: &[ImageRef] = ctx.images().map(Vec::as_slice).unwrap_or(&[]);

        let classifier = Classifier::new(ctx.locale(), self.kind, doc_stats(spans));
        let mut asm = Assembler {
            classifier: &classifier,
            blocks: Vec::new(),
            paragraph: Vec::new(),
            titles: 0,
            dropped: 0,
        };

        for text in page_texts {
            match (text.origin, pages.iter().find(|p| p.number == text.page)) {
                (TextOrigin::Embedded, Some(info)) => {
                    let page_spans: Vec<&Span> =
                        spans.iter().filter(|s| s.page == text.page).collect();
                    let anchors: Vec<TableAnchor> = tables
                        .iter()
                        .filter(|t| t.page == text.page)
                        .filter_map(|t| t.anchor)
                        .collect();
                    asm.layout_page(info, &page_spans, &anchors);
                }
                _ => asm.text_page(text),
            }
            for image in images.iter().filter(|i| i.page == text.page) {
                asm.blocks.push(image.markdown_link());
            }
        }

        let (titles, dropped, blocks) = (asm.titles, asm.dropped, asm.blocks.len());
        let markdown = asm.blocks.join("\n\n");
        debug!(titles, dropped, blocks, bytes = markdown.len(), "first pass assembled");
        ctx.set_markdown(markdown);
        Ok(StageReport::done().with_note(format!("{titles} titles, {blocks} blocks")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionConfig, Locale};
    use crate::pipeline::extract::ExtractText;
    use crate::source::{MemorySource, MemorySpan, PdfSource};

    fn assemble(source: &dyn PdfSource, locale: Locale, kind: ContentKind) -> String {
        let config = ConversionConfig::default();
        let env = StageEnv {
            config: &config,
            source,
            ocr: None,
        };
        let mut ctx = ConversionContext::new("t", locale, kind);
        let _ = ExtractText.run(&mut ctx, &env);
        let _ = Assemble::new(kind).run(&mut ctx, &env);
        ctx.markdown().cloned().unwrap_or_default()
    }

    #[test]
    fn numbered_title_then_paragraph() {
        let src = MemorySource::from_text("1. Introduction\nThis is the first paragraph.");
        assert_eq!(
            assemble(&src, Locale::En, ContentKind::Article),
            "# 1. Introduction\n\nThis is the first paragraph."
        );
    }

    #[test]
    fn font_size_drives_title() {
        let src = MemorySource::from_spans(vec![
            MemorySpan::new("Introduction", 16.0),
            MemorySpan::new("This is a paragraph", 12.0),
        ]);
        assert_eq!(
            assemble(&src, Locale::En, ContentKind::Article),
            "# Introduction\n\nThis is a paragraph"
        );
    }

    #[test]
    fn lines_stay_one_per_line_before_fusion() {
        let src = MemorySource::from_text("the first line of prose\ncontinues here.\n\nNew block.");
        assert_eq!(
            assemble(&src, Locale::En, ContentKind::Article),
            "the first line of prose\ncontinues here.\n\nNew block."
        );
    }

    #[test]
    fn numbered_list_items_are_not_titles() {
        let src = MemorySource::from_text("1. Methods\n2. Results\n3. Discussion");
        let md = assemble(&src, Locale::En, ContentKind::Article);
        // Section names stay eligible even inside a numbered run.
        assert!(md.starts_with("# 1. Methods"), "{md}");
        let src = MemorySource::from_text("1. Collect samples\n2. Dry them");
        assert_eq!(
            assemble(&src, Locale::En, ContentKind::Article),
            "1. Collect samples\n2. Dry them"
        );
    }

    #[test]
    fn indented_blocks_keep_indentation() {
        let src = MemorySource::from_text(
            "Body text at the margin\n\n    an indented quotation line\n    and its second line",
        );
        let md = assemble(&src, Locale::En, ContentKind::Article);
        assert!(md.contains("\n\n    an indented quotation line\n    and its second line"), "{md}");
    }

    #[test]
    fn book_chapters_are_level_one() {
        let src = MemorySource::from_text("Chapter 2 The Journey\nIt began on a Tuesday.");
        let md = assemble(&src, Locale::En, ContentKind::Book);
        assert!(md.starts_with("# Chapter 2 The Journey\n\n"), "{md}");
    }

    #[test]
    fn stats_pick_page_one_maximum() {
        let src = MemorySource::from_spans(vec![
            MemorySpan::new("Big Title", 20.0),
            MemorySpan::new("Body words here and more", 12.0),
        ]);
        let config = ConversionConfig::default();
        let env = StageEnv {
            config: &config,
            source: &src,
            ocr: None,
        };
        let mut ctx = ConversionContext::new("t", Locale::En, ContentKind::Article);
        let _ = ExtractText.run(&mut ctx, &env);
        let stats = doc_stats(ctx.spans().map(Vec::as_slice).unwrap_or(&[]));
        assert_eq!(stats.title_size, Some(20.0));
        assert_eq!(stats.median_size, 12.0);
    }
}
