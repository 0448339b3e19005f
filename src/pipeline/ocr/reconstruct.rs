//! Page text rebuilt from an OCR token table.
//!
//! Engines lay text out in their own reading order, which for multi-column
//! or noisy scans is often wrong. Rebuilding from token boxes gives lines
//! by vertical position, words by horizontal position, and paragraph breaks
//! from vertical gaps, independent of the engine's segmentation mode.

use crate::lexicon::Lexicon;
use crate::pipeline::classify::ends_sentence;
use crate::source::OcrToken;
use crate::text::word_count;

/// Tokens whose tops differ by at most this many pixels share a line.
pub const LINE_TOLERANCE_PX: i32 = 10;
/// Top fraction of the page where wide lines are taken as headers.
pub const HEADER_ZONE: f64 = 0.12;
/// Fraction of the page width a top-zone line must span to be a header.
pub const HEADER_WIDTH: f64 = 0.4;
/// Keyword-prefixed lines longer than this are prose, not headers.
pub const MAX_HEADER_WORDS: usize = 8;
/// Vertical gap, in median line heights, that starts a new paragraph.
pub const PARAGRAPH_GAP: f64 = 1.5;

/// One reconstructed line with its pixel extent.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl OcrLine {
    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(1)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }
}

/// Reconstructed page text and the lines believed to be headings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub text: String,
    pub headings: Vec<String>,
}

/// Group word tokens into lines, top to bottom, words left to right.
pub fn group_lines(tokens: &[OcrToken]) -> Vec<OcrLine> {
    let mut words: Vec<&OcrToken> = tokens
        .iter()
        .filter(|t| t.confidence >= 0.0 && !t.text.trim().is_empty())
        .collect();
    words.sort_by_key(|t| (t.top, t.left));

    let mut groups: Vec<Vec<&OcrToken>> = Vec::new();
    for token in words {
        match groups.last_mut() {
            Some(group) if (token.top - group[0].top).abs() <= LINE_TOLERANCE_PX => {
                group.push(token)
            }
            _ => groups.push(vec![token]),
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            group.sort_by_key(|t| t.left);
            OcrLine {
                text: group
                    .iter()
                    .map(|t| t.text.trim())
                    .collect::<Vec<_>>()
                    .join(" "),
                left: group.iter().map(|t| t.left).min().unwrap_or(0),
                top: group.iter().map(|t| t.top).min().unwrap_or(0),
                right: group.iter().map(|t| t.right()).max().unwrap_or(0),
                bottom: group.iter().map(|t| t.bottom()).max().unwrap_or(0),
            }
        })
        .collect()
}

fn is_header(line: &OcrLine, page_width: u32, page_height: u32, lex: &Lexicon) -> bool {
    let in_zone = f64::from(line.top) < HEADER_ZONE * f64::from(page_height);
    let wide = f64::from(line.width()) > HEADER_WIDTH * f64::from(page_width);
    let keyword = lex.starts_with_section_word(&line.text)
        && word_count(&line.text) <= MAX_HEADER_WORDS
        && line.text.chars().next().is_some_and(char::is_uppercase)
        && !ends_sentence(&line.text);
    (in_zone && wide) || keyword
}

/// Rebuild page text from tokens. Headers stand alone between blank lines.
pub fn reconstruct(
    tokens: &[OcrToken],
    page_width: u32,
    page_height: u32,
    lex: &Lexicon,
) -> Reconstruction {
    let lines = group_lines(tokens);
    if lines.is_empty() {
        return Reconstruction::default();
    }
    let mut heights: Vec<i32> = lines.iter().map(OcrLine::height).collect();
    heights.sort_unstable();
    let median_height = f64::from(heights[heights.len() / 2]);

    let mut out: Vec<String> = Vec::new();
    let mut headings = Vec::new();
    let mut prev: Option<&OcrLine> = None;
    let mut prev_header = false;
    for line in &lines {
        let header = is_header(line, page_width, page_height, lex);
        let gap = prev.map_or(0, |p| line.top - p.bottom);
        let breaks = prev.is_some()
            && (header || prev_header || f64::from(gap) > PARAGRAPH_GAP * median_height);
        if breaks {
            out.push(String::new());
        }
        if header {
            headings.push(line.text.clone());
        }
        out.push(line.text.clone());
        prev = Some(line);
        prev_header = header;
    }

    Reconstruction {
        text: out.join("\n"),
        headings,
    }
}
