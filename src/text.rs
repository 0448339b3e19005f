//! Unicode and whitespace helpers shared by every stage.
//!
//! Nothing here knows about Markdown. Functions take `&str`, return owned
//! strings or plain numbers, and never fail.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ── Codepoint classes ────────────────────────────────────────────────────

/// Punctuation and symbols that legitimately appear in English and
/// Portuguese academic prose.
const EXTRA_READABLE: &str = "–—‘’“”«»…•·§©®°±×÷ªº¹²³€£¢µ¶†‡‰′″→←≤≥≠≈∞√∑∫αβγδεθλμπσφωΔΣΩ";

/// True for codepoints an English or Portuguese reader would expect.
pub fn is_readable(c: char) -> bool {
    c.is_ascii_graphic()
        || c.is_whitespace()
        || is_latin_letter(c)
        || EXTRA_READABLE.contains(c)
        || is_ligature(c)
}

/// ASCII letters plus Latin-1 and Latin Extended-A letters with diacritics.
pub fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (('\u{00C0}'..='\u{017F}').contains(&c) && c != '\u{00D7}' && c != '\u{00F7}')
}

fn is_ligature(c: char) -> bool {
    ('\u{FB00}'..='\u{FB06}').contains(&c)
}

/// Fraction of non-whitespace characters that are not [`is_readable`].
pub fn corrupt_ratio(s: &str) -> f64 {
    let mut total = 0usize;
    let mut bad = 0usize;
    for c in s.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if !is_readable(c) {
            bad += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        bad as f64 / total as f64
    }
}

/// Keep ASCII printable characters and Latin letters with diacritics.
pub fn strip_to_readable(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ' || is_latin_letter(*c))
        .collect();
    collapse_spaces(&kept).trim().to_string()
}

// ── Folding ──────────────────────────────────────────────────────────────

/// Canonical composition (NFC).
pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Lowercase and remove diacritics: `"Introdução"` → `"introducao"`.
pub fn fold_diacritics(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fold typographic punctuation to ASCII, expand ligatures, and remove
/// invisible characters. The em dash is kept.
pub fn fold_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{FB05}' | '\u{FB06}' => out.push_str("st"),
            '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' | '\u{202F}' => out.push(' '),
            '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Remove control characters other than `\n` and `\t`.
pub fn strip_control(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Convert CRLF and lone CR to LF.
pub fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Collapse runs of spaces and tabs after the leading indentation.
pub fn collapse_spaces(line: &str) -> String {
    let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
    let (indent, rest) = line.split_at(indent_len);
    let mut out = String::with_capacity(line.len());
    out.push_str(indent);
    let mut prev_space = false;
    for c in rest.chars() {
        if c == ' ' || c == '\t' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

// ── Words and keys ───────────────────────────────────────────────────────

/// Alphabetic words (letters, apostrophes, and inner hyphens).
pub fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
}

/// Whitespace-separated tokens.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Key used to compare lines for duplication: folded, alphanumeric only,
/// single-spaced.
pub fn line_key(s: &str) -> String {
    let folded = fold_diacritics(s);
    let mut out = String::with_capacity(folded.len());
    for token in folded.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// Anchor slug: folded, ASCII alphanumerics joined by `-`.
pub fn slug(s: &str) -> String {
    let folded = fold_diacritics(s);
    let mut out = String::new();
    for token in folded.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(token);
    }
    out
}

/// True when the string contains at least one letter and every letter is
/// uppercase.
pub fn is_all_caps(s: &str) -> bool {
    let mut letters = s.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_ratio_counts_unexpected_codepoints() {
        assert_eq!(corrupt_ratio("Introdução à análise"), 0.0);
        assert!(corrupt_ratio("\u{E001}\u{E002}ab") > 0.4);
        assert_eq!(corrupt_ratio("   "), 0.0);
    }

    #[test]
    fn strip_keeps_diacritics() {
        assert_eq!(strip_to_readable("Aná\u{E000}lise   final"), "Análise final");
    }

    #[test]
    fn fold_punctuation_keeps_em_dash() {
        assert_eq!(
            fold_punctuation("“Quoted” — it’s ﬁne…"),
            "\"Quoted\" — it's fine..."
        );
        assert_eq!(fold_punctuation("a\u{00AD}b–c"), "ab-c");
    }

    #[test]
    fn fold_diacritics_lowercases() {
        assert_eq!(fold_diacritics("Introdução"), "introducao");
        assert_eq!(fold_diacritics("MÉTODOS"), "metodos");
    }

    #[test]
    fn collapse_spaces_keeps_indent() {
        assert_eq!(collapse_spaces("  - a   b\t c"), "  - a b c");
    }

    #[test]
    fn slug_and_key() {
        assert_eq!(slug("Silva, 2020"), "silva-2020");
        assert_eq!(slug("São Paulo & Cia."), "sao-paulo-cia");
        assert_eq!(line_key("  Página 3 — Revista!"), "pagina 3 revista");
    }

    #[test]
    fn all_caps_needs_letters() {
        assert!(is_all_caps("RESULTS AND DISCUSSION"));
        assert!(!is_all_caps("2020"));
        assert!(!is_all_caps("Results"));
    }

    #[test]
    fn words_split_on_punctuation() {
        let w: Vec<&str> = words("well-known, 'quoted' (x)").collect();
        assert_eq!(w, vec!["well-known", "quoted", "x"]);
    }

    #[test]
    fn newline_normalisation() {
        assert_eq!(normalize_newlines("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(strip_control("a\u{0007}b\n"), "ab\n");
    }
}
