//! Span → line → block grouping by position.
//!
//! Spans arrive sorted by `(top, left)` within a page. A span joins the
//! current line when its baseline sits within half a font size of the line's;
//! inside a line spans are re-sorted by `x` and joined with a space when the
//! horizontal gap is wider than a fraction of the font size. Small digit runs
//! next to larger text become Unicode superscripts so footnote markers
//! survive as text. Lines split into blocks at wide vertical gaps and at
//! changes of size or weight.

use super::context::Span;

/// Baseline drift, as a fraction of font size, tolerated inside one line.
const LINE_TOLERANCE: f32 = 0.5;
/// Horizontal gap, as a fraction of font size, that implies a word break.
const SPACE_GAP: f32 = 0.15;
/// Vertical gap, as a fraction of font size, that implies a paragraph break.
const PARAGRAPH_GAP: f32 = 0.7;
/// Relative size change that starts a new block.
const SIZE_CHANGE: f32 = 0.15;
/// Digit spans at most this fraction of the line size are superscripts.
const SUPERSCRIPT_RATIO: f32 = 0.8;

/// A visual line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub page: usize,
    pub text: String,
    /// Size carrying the most characters.
    pub size: f32,
    /// Most characters are set in a bold face.
    pub bold: bool,
    pub x: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Char-weighted median font size over `spans`. `None` when there is no text.
pub fn median_font_size<'a>(spans: impl IntoIterator<Item = &'a Span>) -> Option<f32> {
    let mut weighted: Vec<(f32, usize)> = spans
        .into_iter()
        .map(|s| (s.size, s.text.chars().filter(|c| !c.is_whitespace()).count()))
        .filter(|(size, n)| *n > 0 && *size > 0.0)
        .collect();
    if weighted.is_empty() {
        return None;
    }
    weighted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: usize = weighted.iter().map(|(_, n)| n).sum();
    let half = total.div_ceil(2);
    let mut seen = 0;
    for (size, n) in &weighted {
        seen += n;
        if seen >= half {
            return Some(*size);
        }
    }
    weighted.last().map(|(s, _)| *s)
}

/// Map ASCII digits to superscript digits.
pub fn to_superscript(digits: &str) -> String {
    digits
        .chars()
        .map(|c| match c {
            '0' => '⁰',
            '1' => '¹',
            '2' => '²',
            '3' => '³',
            '4' => '⁴',
            '5' => '⁵',
            '6' => '⁶',
            '7' => '⁷',
            '8' => '⁸',
            '9' => '⁹',
            other => other,
        })
        .collect()
}

/// Group one page's spans, sorted by `(top, left)`, into baseline groups.
pub fn group_lines<'a>(spans: &[&'a Span]) -> Vec<Vec<&'a Span>> {
    let mut groups: Vec<Vec<&'a Span>> = Vec::new();
    for span in spans {
        if span.text.trim().is_empty() {
            continue;
        }
        let joins = groups.last().is_some_and(|g| {
            let base = g[0];
            let size = base.size.max(span.size).max(1.0);
            (span.y - base.y).abs() <= size * LINE_TOLERANCE
        });
        if joins {
            if let Some(g) = groups.last_mut() {
                g.push(span);
            }
        } else {
            groups.push(vec![span]);
        }
    }
    for g in &mut groups {
        g.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    groups
}

/// Group one page's spans, sorted by `(top, left)`, into lines.
pub fn lines_from_spans(spans: &[&Span]) -> Vec<Line> {
    group_lines(spans).into_iter().map(join_line).collect()
}

fn join_line(spans: Vec<&Span>) -> Line {
    let mut by_size: Vec<(f32, usize)> = Vec::new();
    let mut bold_chars = 0usize;
    let mut total_chars = 0usize;
    for s in &spans {
        let n = s.text.chars().filter(|c| !c.is_whitespace()).count();
        total_chars += n;
        if s.is_bold() {
            bold_chars += n;
        }
        match by_size.iter_mut().find(|(sz, _)| (sz - s.size).abs() < 0.25) {
            Some(entry) => entry.1 += n,
            None => by_size.push((s.size, n)),
        }
    }
    let size = by_size
        .iter()
        .max_by_key(|(_, n)| *n)
        .map(|(s, _)| *s)
        .unwrap_or(0.0);

    let mut text = String::new();
    let mut prev_x1: Option<f32> = None;
    for s in &spans {
        let piece = s.text.trim_end();
        let digits = piece.trim();
        let is_marker = !digits.is_empty()
            && digits.len() <= 3
            && digits.chars().all(|c| c.is_ascii_digit())
            && size > 0.0
            && s.size <= size * SUPERSCRIPT_RATIO
            && spans.len() > 1;
        if is_marker {
            text.push_str(&to_superscript(digits));
        } else {
            if let Some(x1) = prev_x1 {
                let gap = s.bbox.x0 - x1;
                let spaced = text.ends_with(' ') || piece.starts_with(' ');
                if gap > s.size.max(1.0) * SPACE_GAP && !spaced {
                    text.push(' ');
                }
            }
            text.push_str(piece);
        }
        prev_x1 = Some(s.bbox.x1);
    }

    Line {
        page: spans.first().map(|s| s.page).unwrap_or(0),
        text: text.trim().to_string(),
        size,
        bold: total_chars > 0 && bold_chars * 2 > total_chars,
        x: spans.iter().map(|s| s.bbox.x0).fold(f32::MAX, f32::min),
        top: spans.iter().map(|s| s.bbox.y0).fold(f32::MAX, f32::min),
        bottom: spans.iter().map(|s| s.bbox.y1).fold(f32::MIN, f32::max),
    }
}

/// Split lines into blocks at paragraph gaps and style changes.
pub fn blocks(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let mut out: Vec<Vec<Line>> = Vec::new();
    for line in lines {
        let starts_block = match out.last().and_then(|b| b.last()) {
            None => true,
            Some(prev) => {
                let size = prev.size.max(line.size).max(1.0);
                let gap = line.top - prev.bottom;
                let resized = (prev.size - line.size).abs() / size > SIZE_CHANGE;
                gap > size * PARAGRAPH_GAP || resized || prev.bold != line.bold
            }
        };
        if starts_block {
            out.push(vec![line]);
        } else if let Some(b) = out.last_mut() {
            b.push(line);
        }
    }
    out
}

/// Plain text of a page: lines joined by `\n`, blocks by a blank line.
pub fn page_text(blocks: &[Vec<Line>]) -> String {
    blocks
        .iter()
        .map(|b| {
            b.iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
