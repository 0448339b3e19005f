//! Running header and footer removal.
//!
//! Page furniture survives extraction as short lines: page numbers,
//! `Title — Page 5` footers, journal and volume banners, copyright notices,
//! and running heads repeated on every page. These are dropped wherever
//! they appear, including when an earlier stage promoted them to a heading.
//! Strong titles (known section names, chapter openers, numbered headings)
//! are never dropped.

use super::{fenced_mask, heading_parts, is_table_row, MarkdownRewrite, Rewritten};
use crate::config::ContentKind;
use crate::lexicon::Lexicon;
use crate::pipeline::classify::{list_marker, numbering_depth};
use crate::text::{line_key, word_count};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Occurrences beyond which a short line is a running head.
pub const REPEAT_LIMIT: usize = 3;

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:page|p[aá]gina|p[aá]g\.?|p\.)\s*)?[-–—]?\s*\d{1,4}\s*[-–—]?(?:\s*(?:of|de|/)\s*\d{1,4})?$",
    )
    .unwrap()
});
static RE_PAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)[—–-]\s*(?:page|p[aá]gina|p[aá]g\.?|p\.)\s*\d{1,4}\s*$").unwrap()
});
static RE_VOLUME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:vol\.?|volume|v\.)\s*\d+.{0,20}\b(?:no\.?|n\.|nº|num\.?|n[uú]mero|issue)\s*\d+",
    )
    .unwrap()
});
static RE_COPYRIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:©|\(c\)|copyright\b)|all rights reserved|todos os direitos reservados")
        .unwrap()
});
static RE_DOI_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:doi:\s*|https?://(?:dx\.)?doi\.org/)\S+$").unwrap());

/// The header/footer filter.
#[derive(Debug, Clone, Copy)]
pub struct HeaderFilter {
    repeat_limit: usize,
    /// Longest line (in words) considered a running head.
    max_phrase_words: usize,
}

impl HeaderFilter {
    /// Book running heads carry chapter titles and run longer.
    pub fn for_kind(kind: ContentKind) -> Self {
        let max_phrase_words = match kind.effective() {
            ContentKind::Book => 10,
            _ => 8,
        };
        Self {
            repeat_limit: REPEAT_LIMIT,
            max_phrase_words,
        }
    }

    fn is_furniture(&self, text: &str, lex: &Lexicon) -> bool {
        let words = word_count(text);
        if RE_PAGE_NUMBER.is_match(text)
            || RE_PAGE_SUFFIX.is_match(text)
            || RE_DOI_LINE.is_match(text)
        {
            return true;
        }
        if words > self.max_phrase_words * 2 {
            return false;
        }
        RE_VOLUME.is_match(text)
            || RE_COPYRIGHT.is_match(text)
            || (lex.contains_header_phrase(text) && text.chars().any(|c| c.is_ascii_digit()))
    }
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::for_kind(ContentKind::Article)
    }
}

fn is_strong_title(text: &str, lex: &Lexicon) -> bool {
    lex.is_section_name(text) || lex.is_chapter_heading(text) || numbering_depth(text).is_some()
}

impl MarkdownRewrite for HeaderFilter {
    fn name(&self) -> &'static str {
        "header-filter"
    }

    fn rewrite(&self, markdown: &str, lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);

        let candidate = |i: usize| {
            let line = lines[i];
            if fenced[i] || line.trim().is_empty() || is_table_row(line) {
                return None;
            }
            match heading_parts(line) {
                Some((_, text)) => Some((text, true)),
                None if list_marker(line).is_some() => None,
                None => Some((line.trim(), false)),
            }
        };

        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..lines.len() {
            if let Some((text, _)) = candidate(i) {
                if word_count(text) <= self.max_phrase_words {
                    let key = line_key(text);
                    if !key.is_empty() {
                        *counts.entry(key).or_default() += 1;
                    }
                }
            }
        }

        let mut out: Vec<&str> = Vec::with_capacity(lines.len());
        let mut changes = 0;
        for (i, &line) in lines.iter().enumerate() {
            let drop = candidate(i).is_some_and(|(text, heading)| {
                if heading && is_strong_title(text, lex) {
                    return false;
                }
                let repeated = counts
                    .get(&line_key(text))
                    .is_some_and(|&n| n > self.repeat_limit);
                repeated || self.is_furniture(text, lex)
            });
            if drop {
                changes += 1;
                continue;
            }
            let blank = line.trim().is_empty() && !fenced[i];
            let prev_blank = out.last().map_or(true, |l| l.trim().is_empty());
            if blank && prev_blank {
                changes += 1;
                continue;
            }
            out.push(line);
        }
        while out.last().is_some_and(|l| l.trim().is_empty()) {
            out.pop();
            changes += 1;
        }

        if changes == 0 {
            return Rewritten::unchanged(markdown);
        }
        Rewritten {
            text: out.join("\n"),
            changes,
        }
    }
}
