//! Quality analysis of extracted text.
//!
//! The same score rates the embedded text layer (should OCR run?) and each
//! OCR attempt's reconstruction (its structural quality), so the two are
//! directly comparable when deciding whether OCR replaces a page.

use crate::lexicon::Lexicon;
use crate::text::{corrupt_ratio, line_key, words};
use std::collections::HashMap;

/// Lines shorter than this (in chars) count as short.
pub const SHORT_LINE_CHARS: usize = 10;
/// Mean line length that earns full marks.
pub const TARGET_LINE_LEN: f64 = 60.0;
/// Corrupt ratio is multiplied by this before being subtracted.
pub const CORRUPT_SCALE: f64 = 5.0;
/// Word frequency below which repetition is not penalised.
pub const WORD_FREQ_FLOOR: f64 = 0.05;
/// Width of the band over which the repetition penalty grows to its maximum.
pub const WORD_FREQ_SPAN: f64 = 0.25;
/// Word frequency that counts as severe repetition.
pub const SEVERE_WORD_FREQ: f64 = 0.15;
/// Fewer long words than this and frequency is not meaningful.
pub const MIN_WORDS_FOR_FREQ: usize = 50;
/// Occurrences of one header phrase beyond which the text is duplicated.
pub const HEADER_PHRASE_LIMIT: usize = 5;
/// Share of repeated long lines that counts as severe duplication.
pub const SEVERE_DUPLICATE_RATIO: f64 = 0.3;
/// Texts longer than this are suspicious when they repeat at all.
pub const LONG_TEXT_CHARS: usize = 200_000;
/// Duplicate ratio that flags a long text.
pub const LONG_TEXT_DUPLICATE_RATIO: f64 = 0.1;

const W_DENSITY: f64 = 0.25;
const W_LINE_LEN: f64 = 0.2;
const W_SHORT: f64 = 0.2;
const W_CORRUPT: f64 = 0.2;
const W_REPETITION: f64 = 0.15;

/// Measurements over one text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuality {
    /// Non-empty lines over all lines.
    pub density: f64,
    pub mean_line_len: f64,
    pub short_line_ratio: f64,
    pub corrupt_ratio: f64,
    /// Count of the most frequent word (≥ 4 letters) over all such words.
    pub max_word_freq: f64,
    /// Share of lines (≥ 20 chars) that repeat an earlier line.
    pub duplicate_ratio: f64,
    /// Occurrences of the most repeated header phrase.
    pub header_repeats: usize,
    pub chars: usize,
    /// Weighted score in `[0, 1]`.
    pub score: f64,
}

impl TextQuality {
    /// Repetition or duplication bad enough that OCR may replace the text.
    pub fn severe_repetition(&self) -> bool {
        self.max_word_freq > SEVERE_WORD_FREQ
            || self.header_repeats > HEADER_PHRASE_LIMIT
            || self.duplicate_ratio > SEVERE_DUPLICATE_RATIO
            || (self.chars > LONG_TEXT_CHARS && self.duplicate_ratio > LONG_TEXT_DUPLICATE_RATIO)
    }

    /// Whether this text should trigger OCR.
    pub fn needs_ocr(&self, threshold: f64) -> bool {
        self.score < threshold || self.severe_repetition()
    }
}

/// Measure `text`.
pub fn analyze(text: &str, lex: &Lexicon) -> TextQuality {
    let lines: Vec<&str> = text.lines().collect();
    let content: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if content.is_empty() {
        return TextQuality::default();
    }

    let density = content.len() as f64 / lines.len() as f64;
    let lens: Vec<usize> = content.iter().map(|l| l.chars().count()).collect();
    let mean_line_len = lens.iter().sum::<usize>() as f64 / lens.len() as f64;
    let short_line_ratio =
        lens.iter().filter(|n| **n < SHORT_LINE_CHARS).count() as f64 / lens.len() as f64;
    let corrupt = corrupt_ratio(text);
    let max_word_freq = max_word_frequency(text);
    let duplicate_ratio = duplicate_ratio(&content);
    let header_repeats = header_repeats(&content, lex);

    let repetition = 1.0 - ((max_word_freq - WORD_FREQ_FLOOR) / WORD_FREQ_SPAN).clamp(0.0, 1.0);
    let score = W_DENSITY * density
        + W_LINE_LEN * (mean_line_len / TARGET_LINE_LEN).min(1.0)
        + W_SHORT * (1.0 - short_line_ratio)
        + W_CORRUPT * (1.0 - (corrupt * CORRUPT_SCALE).min(1.0))
        + W_REPETITION * repetition;

    TextQuality {
        density,
        mean_line_len,
        short_line_ratio,
        corrupt_ratio: corrupt,
        max_word_freq,
        duplicate_ratio,
        header_repeats,
        chars: text.len(),
        score: score.clamp(0.0, 1.0),
    }
}

fn max_word_frequency(text: &str) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for w in words(text).filter(|w| w.chars().count() >= 4) {
        *counts.entry(w.to_lowercase()).or_default() += 1;
        total += 1;
    }
    if total < MIN_WORDS_FOR_FREQ {
        return 0.0;
    }
    counts.values().copied().max().unwrap_or(0) as f64 / total as f64
}

fn duplicate_ratio(lines: &[&str]) -> f64 {
    let long: Vec<String> = lines
        .iter()
        .filter(|l| l.chars().count() >= 20)
        .map(|l| line_key(l))
        .collect();
    if long.is_empty() {
        return 0.0;
    }
    let mut seen = std::collections::HashSet::new();
    let repeats = long.iter().filter(|k| !seen.insert(k.as_str())).count();
    repeats as f64 / long.len() as f64
}

fn header_repeats(lines: &[&str], lex: &Lexicon) -> usize {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for line in lines.iter().filter(|l| lex.contains_header_phrase(l)) {
        *counts.entry(line_key(line)).or_default() += 1;
    }
    counts.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locale;
    use crate::lexicon::lexicon;

    fn en() -> &'static Lexicon {
        lexicon(Locale::En)
    }

    const PROSE: &str = "The experiment measured the response of each sample under load.\n\
        Results were consistent with the model proposed in earlier work.\n\
        \n\
        Further analysis of the variance confirmed the primary hypothesis.";

    #[test]
    fn clean_prose_scores_high() {
        let q = analyze(PROSE, en());
        assert!(q.score > 0.8, "{q:?}");
        assert!(!q.needs_ocr(0.5));
    }

    #[test]
    fn fragmented_text_scores_low() {
        let q = analyze("a\n\n\nb\n\n\nc\n\n\nd\n\n\n", en());
        assert!(q.score < 0.5, "{q:?}");
        assert!(q.needs_ocr(0.5));
    }

    #[test]
    fn repeated_header_phrase_is_severe() {
        let text = "Journal of Applied Things\nsome body text that is long enough\n".repeat(7);
        let q = analyze(&text, en());
        assert_eq!(q.header_repeats, 7);
        assert!(q.severe_repetition());
    }

    #[test]
    fn duplicated_lines_are_severe() {
        let text = "this same sentence appears over and over\n".repeat(5);
        let q = analyze(&text, en());
        assert!(q.duplicate_ratio > 0.7);
        assert!(q.severe_repetition());
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(analyze("", en()).score, 0.0);
        assert!(analyze("  \n ", en()).needs_ocr(0.5));
    }
}
