//! Individual classification signals.
//!
//! Each function scores one aspect of a fragment and returns a signed
//! number; [`super::Classifier`] sums them. Vetoes are separate: a vetoed
//! fragment is never a title whatever its score.

use crate::lexicon::{is_roman, Lexicon};
use crate::text::{is_all_caps, word_count, words};
use once_cell::sync::Lazy;
use regex::Regex;

// ── List markers ─────────────────────────────────────────────────────────

/// Kind of marker opening a list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMarker {
    /// `-`, `*`, `•` and friends.
    Bullet,
    /// `3.` or `3)`.
    Ordered(u32),
    /// `a.`, `b)`, `iv.`.
    Letter,
}

static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})[.)]\s+\S").unwrap());
static RE_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z]|i{1,3}|iv|v|vi{1,3}|ix|x)[.)]\s+\S").unwrap());

const BULLETS: &[char] = &['-', '*', '+', '•', '◦', '▪', '▫', '‣', '●', '○', '■', '□', '–', '·'];

/// Marker at the start of `line` (leading indentation ignored), and the
/// byte length of marker plus following whitespace.
pub fn list_marker(line: &str) -> Option<(ListMarker, usize)> {
    let t = line.trim_start();
    let mut chars = t.chars();
    let first = chars.next()?;
    if BULLETS.contains(&first) && chars.next().is_some_and(char::is_whitespace) {
        let body = t[first.len_utf8()..].trim_start();
        if body.is_empty() || (first == '-' && body.starts_with('-')) {
            return None;
        }
        return Some((ListMarker::Bullet, t.len() - body.len()));
    }
    if let Some(c) = RE_ORDERED.captures(t) {
        let n = c[1].parse().ok()?;
        let body_start = t.len() - t[c[1].len() + 1..].trim_start().len();
        return Some((ListMarker::Ordered(n), body_start));
    }
    if RE_LETTER.is_match(t) {
        let dot = t.find(['.', ')'])?;
        let body_start = t.len() - t[dot + 1..].trim_start().len();
        return Some((ListMarker::Letter, body_start));
    }
    None
}

// ── Shapes ───────────────────────────────────────────────────────────────

/// Ends with `.`, `!`, `?` or an ellipsis, possibly inside closing quotes or
/// brackets.
pub fn ends_sentence(text: &str) -> bool {
    let t = text
        .trim_end()
        .trim_end_matches(['"', '\'', '”', '’', ')', ']', '»', '*', '_']);
    t.ends_with(['.', '!', '?', '…'])
}

/// Depth of a leading `N.`/`N.N`/`N.N.N` numbering (`2.3 Results` → 2).
pub fn numbering_depth(text: &str) -> Option<usize> {
    let token = text.split_whitespace().next()?;
    let bare = token.trim_end_matches(['.', ')', ':']);
    if bare.is_empty() || text.split_whitespace().nth(1).is_none() {
        return None;
    }
    let parts: Vec<&str> = bare.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()));
    numeric.then_some(parts.len())
}

/// Leading Roman numeral followed by `.` or `)` (`IV. Discussion`).
pub fn has_roman_prefix(text: &str) -> bool {
    text.split_whitespace().next().is_some_and(|token| {
        let bare = token.trim_end_matches(['.', ')']);
        bare.len() < token.len() && is_roman(bare)
    })
}

/// Structural shape of a title: enough letters, mostly letters, no URLs,
/// e-mail addresses or assignments.
pub fn is_title_shaped(text: &str) -> bool {
    let mut letters = 0usize;
    let mut visible = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if c.is_alphabetic() {
            letters += 1;
        }
    }
    let lower = text.to_lowercase();
    letters >= 2
        && letters * 2 >= visible
        && !lower.contains("http")
        && !lower.contains("www.")
        && !text.contains('@')
        && !text.contains('=')
}

// ── Scores ───────────────────────────────────────────────────────────────

/// Size relative to the document median, weight, position, OCR hint.
pub fn font_score(size: f32, median: f32, bold: bool, y_rel: Option<f32>, hint: bool) -> f64 {
    let mut score = 0.0;
    if size > 0.0 && median > 0.0 {
        let ratio = size / median;
        score += if ratio >= 1.5 {
            4.0
        } else if ratio >= 1.25 {
            3.0
        } else if ratio >= 1.1 {
            2.0
        } else if ratio <= 0.9 {
            -1.0
        } else {
            0.0
        };
    }
    if bold {
        score += 2.0;
    }
    if y_rel.is_some_and(|y| y < 0.15) {
        score += 1.0;
    }
    if hint {
        score += 3.0;
    }
    score
}

/// ALL CAPS, Title Case, initial capital, or a lowercase start.
pub fn caps_score(text: &str) -> f64 {
    let body = crate::lexicon::strip_numbering(text);
    let Some(first) = body.chars().find(|c| c.is_alphabetic()) else {
        return 0.0;
    };
    let letters = body.chars().filter(|c| c.is_alphabetic()).count();
    if letters >= 2 && is_all_caps(body) {
        return 2.0;
    }
    let long: Vec<&str> = words(body).filter(|w| w.chars().count() >= 4).collect();
    if !long.is_empty() {
        let capitalised = long
            .iter()
            .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
            .count();
        if capitalised as f64 / long.len() as f64 >= 0.6 {
            return 1.5;
        }
    }
    if first.is_uppercase() {
        0.5
    } else {
        -2.0
    }
}

/// Word count inside the title bands.
pub fn length_score(text: &str) -> f64 {
    match word_count(text) {
        1..=8 => 2.0,
        9..=12 => 1.0,
        13..=20 => -1.0,
        _ => 0.0,
    }
}

/// Vocabulary, numbering, verbs, and dangling punctuation.
pub fn linguistic_score(text: &str, lex: &Lexicon) -> f64 {
    let mut score = 0.0;
    if lex.is_section_name(text) {
        score += 3.0;
    } else if lex.starts_with_section_word(text) {
        score += 1.5;
    }
    if numbering_depth(text).is_some() {
        score += 3.0;
    } else if has_roman_prefix(text) {
        score += 2.0;
    }
    let verbs = lex.count_verbs(text) as f64;
    score += (-2.0 * verbs).max(-4.0);
    if text.trim_end().ends_with([',', ';']) {
        score -= 3.0;
    }
    if lex.starts_with_connective(text) {
        score -= 3.0;
    }
    score
}

/// Leading preposition; short numbered titles.
pub fn context_score(text: &str, lex: &Lexicon) -> f64 {
    let mut score = 0.0;
    if lex.starts_with_preposition(text) {
        score -= 2.0;
    }
    if numbering_depth(text).is_some() && word_count(text) <= 6 {
        score += 1.0;
    }
    score
}

static RE_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-zA-Z)\]]\s*[=<>≤≥±×÷+^]\s*[0-9a-zA-Z(\[]").unwrap());
static RE_AUTHOR_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\p{Lu}[\p{L}'-]+(?: et al\.?)?,?\s+\d{4}[a-z]?\s*\)").unwrap());
static RE_REFERENCE_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bet al\.|\bdoi\b|https?://|\bpp\.\s*\d").unwrap());
static RE_FOOTNOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[¹²³⁴⁵⁶⁷⁸⁹⁰]+\s*\S|\[\d{1,3}\]\s+\S|\d{1,3}\s+\p{Ll})").unwrap()
});
static RE_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:page|p[aá]gina|p[aá]g\.?|p\.)\s*\d+\b").unwrap());

/// Expression, reference, footnote and page shapes (−3 each, floor −6).
pub fn semantic_penalty(text: &str) -> f64 {
    let t = text.trim();
    let hits = [
        RE_EXPRESSION.is_match(t),
        RE_AUTHOR_YEAR.is_match(t) || RE_REFERENCE_MARKS.is_match(t),
        RE_FOOTNOTE.is_match(t),
        RE_PAGE.is_match(t),
    ]
    .iter()
    .filter(|h| **h)
    .count() as f64;
    (-3.0 * hits).max(-6.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locale;
    use crate::lexicon::lexicon;

    #[test]
    fn markers() {
        assert_eq!(list_marker("- item").map(|m| m.0), Some(ListMarker::Bullet));
        assert_eq!(list_marker("  • item").map(|m| m.1), Some(4));
        assert_eq!(list_marker("12) item").map(|m| m.0), Some(ListMarker::Ordered(12)));
        assert_eq!(list_marker("b. item").map(|m| m.0), Some(ListMarker::Letter));
        assert_eq!(list_marker("iv) item").map(|m| m.0), Some(ListMarker::Letter));
        assert!(list_marker("--- rule").is_none());
        assert!(list_marker("2024 was a year").is_none());
        assert!(list_marker("-minus").is_none());
    }

    #[test]
    fn sentence_end_sees_through_quotes() {
        assert!(ends_sentence("It ended."));
        assert!(ends_sentence("He said \"stop!\""));
        assert!(ends_sentence("Wait…"));
        assert!(ends_sentence("(see above.)"));
        assert!(!ends_sentence("1. Introduction"));
    }

    #[test]
    fn numbering() {
        assert_eq!(numbering_depth("2.3 Results"), Some(2));
        assert_eq!(numbering_depth("1. Introduction"), Some(1));
        assert_eq!(numbering_depth("2024 Results"), None);
        assert_eq!(numbering_depth("3."), None);
        assert!(has_roman_prefix("IV. Discussion"));
        assert!(!has_roman_prefix("I think so"));
    }

    #[test]
    fn caps_bands() {
        assert_eq!(caps_score("RELATED WORK"), 2.0);
        assert_eq!(caps_score("1. Introduction"), 1.5);
        assert_eq!(caps_score("This is a paragraph"), 0.5);
        assert_eq!(caps_score("continued from above"), -2.0);
    }

    #[test]
    fn verbs_are_capped() {
        let en = lexicon(Locale::En);
        let s = linguistic_score("it is what it was and is and was", en);
        assert_eq!(s, -4.0);
    }

    #[test]
    fn semantic_shapes() {
        assert_eq!(semantic_penalty("E = mc2"), -3.0);
        assert_eq!(semantic_penalty("Smith et al. page 4"), -6.0);
        assert_eq!(semantic_penalty("(Silva, 2020)"), -3.0);
        assert_eq!(semantic_penalty("¹ See the appendix"), -3.0);
        assert_eq!(semantic_penalty("Introduction"), 0.0);
    }

    #[test]
    fn title_shape() {
        assert!(is_title_shaped("Results"));
        assert!(!is_title_shaped("x = 3"));
        assert!(!is_title_shaped("see https://example.org"));
        assert!(!is_title_shaped("12 34 56"));
    }
}
