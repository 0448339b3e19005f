//! Paragraph fusion: joining wrapped lines back into paragraphs.
//!
//! Two adjacent plain lines are joined with a space unless the first ends a
//! sentence, the second opens one with a locale sentence opener or a
//! context-break marker, or either looks like a title. A line ending in a
//! hyphenated word fragment is joined without space only when the repaired
//! word is plausible; otherwise the break stays.
//!
//! Structural lines (headings, list items, tables, quotes, fences, images,
//! anchors, indented blocks, unmistakable code) are never joined with
//! anything.

use super::classify::{ends_sentence, list_marker, Classifier};
use super::detect::code::is_strong_code_line;
use crate::config::Locale;
use crate::lexicon::{lexicon, Lexicon};

/// Longest consonant run a repaired word may contain.
const MAX_CONSONANT_RUN: usize = 4;
/// Longest vowel run a repaired word may contain.
const MAX_VOWEL_RUN: usize = 3;
/// Indentation at which a line is treated as a quote or code candidate.
const STRUCTURAL_INDENT: usize = 4;

fn is_vowel(c: char) -> bool {
    "aeiouyáéíóúâêôãõàüAEIOUYÁÉÍÓÚÂÊÔÃÕÀÜ".contains(c)
}

/// A word is plausible when it has a vowel and no pathological consonant or
/// vowel runs.
pub fn is_plausible_word(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() || !letters.iter().any(|c| is_vowel(*c)) {
        return false;
    }
    let (mut consonants, mut vowels) = (0usize, 0usize);
    for c in letters {
        if is_vowel(c) {
            vowels += 1;
            consonants = 0;
        } else {
            consonants += 1;
            vowels = 0;
        }
        if consonants > MAX_CONSONANT_RUN || vowels > MAX_VOWEL_RUN {
            return false;
        }
    }
    true
}

/// `"infor-"` + `"mation is key"` → `"information is key"` when the joined
/// word is plausible.
pub fn repair_hyphen(left: &str, right: &str) -> Option<String> {
    let stem = left.strip_suffix('-')?;
    let head = stem.rsplit(char::is_whitespace).next().unwrap_or(stem);
    let tail = right.split_whitespace().next()?;
    let tail_word: String = tail.chars().take_while(|c| c.is_alphabetic()).collect();
    if head.is_empty() || tail_word.is_empty() {
        return None;
    }
    let joined = format!("{head}{tail_word}");
    is_plausible_word(&joined).then(|| format!("{stem}{}", right.trim_start()))
}

/// True when `left` ends with a letter followed by a hyphen and `right`
/// starts with a lowercase letter.
fn is_hyphen_break(left: &str, right: &str) -> bool {
    let mut rev = left.chars().rev();
    rev.next() == Some('-')
        && rev.next().is_some_and(char::is_alphabetic)
        && right.trim_start().chars().next().is_some_and(char::is_lowercase)
}

/// Lines that take no part in fusion.
pub fn is_structural(line: &str) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    let t = line.trim();
    t.is_empty()
        || indent >= STRUCTURAL_INDENT
        || t.starts_with('#')
        || t.starts_with('|')
        || t.starts_with('>')
        || t.starts_with("```")
        || t.starts_with("![")
        || t.starts_with("<a ")
        || t.starts_with("[^")
        || t.starts_with("**Table")
        || t.starts_with("**Tabela")
        || list_marker(t).is_some()
        || is_strong_code_line(t)
}

/// The fusion rule for one locale.
#[derive(Debug, Clone)]
pub struct Fusion {
    lex: &'static Lexicon,
    classifier: Classifier,
}

impl Fusion {
    pub fn new(locale: Locale) -> Self {
        Self {
            lex: lexicon(locale),
            classifier: Classifier::text_only(locale),
        }
    }

    /// Whether `cur` continues the paragraph ending with `prev`.
    pub fn should_join(&self, prev: &str, cur: &str) -> bool {
        let (prev, cur) = (prev.trim(), cur.trim());
        !prev.is_empty()
            && !cur.is_empty()
            && !ends_sentence(prev)
            && !self.lex.starts_with_sentence_opener(cur)
            && !self.lex.starts_with_context_break(cur)
            && !self.classifier.looks_like_title(prev)
            && !self.classifier.looks_like_title(cur)
    }

    /// Join `prev` and `cur` if the rule allows it.
    pub fn join(&self, prev: &str, cur: &str) -> Option<String> {
        if is_hyphen_break(prev.trim_end(), cur) {
            return repair_hyphen(prev.trim_end(), cur);
        }
        self.should_join(prev, cur)
            .then(|| format!("{} {}", prev.trim_end(), cur.trim()))
    }

    /// Apply the rule to every pair of adjacent plain lines. Fenced code is
    /// left alone.
    pub fn fuse(&self, markdown: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        let mut joinable = false;
        let mut in_fence = false;
        for line in markdown.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                out.push(line.to_string());
                joinable = false;
                continue;
            }
            if in_fence || is_structural(line) {
                out.push(line.to_string());
                joinable = false;
                continue;
            }
            if joinable {
                if let Some(prev) = out.last_mut() {
                    if let Some(joined) = self.join(prev, line) {
                        *prev = joined;
                        continue;
                    }
                }
            }
            out.push(line.to_string());
            joinable = true;
        }
        out.join("\n")
    }
}
