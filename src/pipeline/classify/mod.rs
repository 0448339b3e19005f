//! Title-versus-paragraph classification.
//!
//! ## How a fragment becomes a title
//!
//! Six signal groups ([`signals`]) are summed: font, capitalisation, length,
//! linguistic, context, and semantic penalties. A fragment is a title when
//! the sum reaches [`TITLE_THRESHOLD`] and no veto applies. Vetoes are
//! absolute: sentence-final punctuation, more than 20 words, no letters, a
//! non-title shape, or membership of a list or table.
//!
//! ## Levels
//!
//! Chapter headings are level 1. Numbered headings take their numbering
//! depth. Top-level section keywords and the document title (largest font on
//! page 1) are level 1. Anything else is level 2. In books every level
//! except the chapter level moves down one.
//!
//! Every decision is logged at `debug` with its component scores.

pub mod signals;

pub use signals::{ends_sentence, list_marker, numbering_depth, ListMarker};

use crate::config::{ContentKind, Locale};
use crate::lexicon::{lexicon, Lexicon};
use crate::text::{corrupt_ratio, strip_to_readable, word_count};
use tracing::debug;

/// Score at which a fragment becomes a title.
pub const TITLE_THRESHOLD: f64 = 8.0;
/// Titles longer than this are vetoed.
const MAX_TITLE_WORDS: usize = 20;
/// Above this share of unreadable codepoints the fragment is repaired.
const CORRUPT_REPAIR_RATIO: f64 = 0.3;
/// A repaired fragment with fewer letters than this is dropped.
const MIN_REPAIRED_LETTERS: usize = 3;

/// One piece of text to classify, with whatever layout evidence exists.
#[derive(Debug, Clone, Default)]
pub struct Fragment<'a> {
    pub text: &'a str,
    pub page: usize,
    /// Font size in points; 0 when unknown.
    pub size: f32,
    pub bold: bool,
    /// Top of the fragment as a fraction of page height.
    pub y_rel: Option<f32>,
    /// OCR reconstruction marked this line as a heading.
    pub heading_hint: bool,
    pub in_list: bool,
    pub in_table: bool,
}

impl<'a> Fragment<'a> {
    /// A fragment with no layout evidence.
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

/// Document-wide statistics the font signal is relative to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DocStats {
    /// Char-weighted median span size.
    pub median_size: f32,
    /// Largest span size on page 1.
    pub title_size: Option<f32>,
}

/// Why a fragment cannot be a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    SentenceEnd,
    TooLong,
    NoLetters,
    NotTitleShaped,
    InList,
    InTable,
}

/// Component scores of one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scores {
    pub font: f64,
    pub caps: f64,
    pub length: f64,
    pub linguistic: f64,
    pub context: f64,
    pub semantic: f64,
}

impl Scores {
    pub fn total(&self) -> f64 {
        self.font + self.caps + self.length + self.linguistic + self.context + self.semantic
    }
}

/// Structural role of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title { level: u8 },
    Paragraph,
    /// Corrupt beyond repair.
    Dropped,
}

/// Outcome of classifying one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub role: Role,
    /// The fragment text, repaired if it was corrupt.
    pub text: String,
    pub scores: Scores,
    pub veto: Option<Veto>,
}

impl Decision {
    pub fn is_title(&self) -> bool {
        matches!(self.role, Role::Title { .. })
    }
}

/// Scores fragments for one locale, content kind, and document.
#[derive(Debug, Clone)]
pub struct Classifier {
    lex: &'static Lexicon,
    kind: ContentKind,
    stats: DocStats,
}

impl Classifier {
    pub fn new(locale: Locale, kind: ContentKind, stats: DocStats) -> Self {
        Self {
            lex: lexicon(locale),
            kind: kind.effective(),
            stats,
        }
    }

    /// A classifier with no font statistics, for text-only decisions.
    pub fn text_only(locale: Locale) -> Self {
        Self::new(locale, ContentKind::Article, DocStats::default())
    }

    pub fn lexicon(&self) -> &'static Lexicon {
        self.lex
    }

    /// First veto that applies to `frag`, if any.
    pub fn veto(&self, frag: &Fragment<'_>) -> Option<Veto> {
        let text = frag.text.trim();
        if frag.in_table {
            Some(Veto::InTable)
        } else if frag.in_list {
            Some(Veto::InList)
        } else if ends_sentence(text) {
            Some(Veto::SentenceEnd)
        } else if word_count(text) > MAX_TITLE_WORDS {
            Some(Veto::TooLong)
        } else if !text.chars().any(char::is_alphabetic) {
            Some(Veto::NoLetters)
        } else if !signals::is_title_shaped(text) {
            Some(Veto::NotTitleShaped)
        } else {
            None
        }
    }

    pub fn scores(&self, frag: &Fragment<'_>) -> Scores {
        let text = frag.text.trim();
        Scores {
            font: signals::font_score(
                frag.size,
                self.stats.median_size,
                frag.bold,
                frag.y_rel,
                frag.heading_hint,
            ),
            caps: signals::caps_score(text),
            length: signals::length_score(text),
            linguistic: signals::linguistic_score(text, self.lex),
            context: signals::context_score(text, self.lex),
            semantic: signals::semantic_penalty(text),
        }
    }

    /// Classify one fragment.
    pub fn classify(&self, frag: &Fragment<'_>) -> Decision {
        let mut text = frag.text.trim().to_string();
        if corrupt_ratio(&text) > CORRUPT_REPAIR_RATIO {
            text = strip_to_readable(&text);
            if text.chars().filter(|c| c.is_alphabetic()).count() < MIN_REPAIRED_LETTERS {
                debug!(original = frag.text, "fragment dropped as corrupt");
                return Decision {
                    role: Role::Dropped,
                    text,
                    scores: Scores::default(),
                    veto: None,
                };
            }
        }
        let repaired = Fragment {
            text: &text,
            ..frag.clone()
        };
        let scores = self.scores(&repaired);
        let veto = self.veto(&repaired);
        let total = scores.total();
        let role = if veto.is_none() && total >= TITLE_THRESHOLD {
            Role::Title {
                level: self.level(&repaired),
            }
        } else {
            Role::Paragraph
        };
        debug!(
            text = %text,
            total,
            font = scores.font,
            caps = scores.caps,
            length = scores.length,
            linguistic = scores.linguistic,
            context = scores.context,
            semantic = scores.semantic,
            veto = ?veto,
            role = ?role,
            "classified fragment"
        );
        Decision {
            role,
            text,
            scores,
            veto,
        }
    }

    /// Text-only title test (no font evidence), used by fusion and the
    /// rewriting strategies.
    pub fn looks_like_title(&self, text: &str) -> bool {
        let frag = Fragment::text(text);
        self.veto(&frag).is_none() && self.scores(&frag).total() >= TITLE_THRESHOLD
    }

    /// Markdown heading level for a fragment already judged a title.
    pub fn level(&self, frag: &Fragment<'_>) -> u8 {
        let text = frag.text.trim();
        let book = self.kind == ContentKind::Book;
        let shift = u8::from(book);
        let level = if self.lex.is_chapter_heading(text) {
            1
        } else if let Some(depth) = signals::numbering_depth(text) {
            depth.min(5) as u8 + shift
        } else if self.lex.is_top_level_section(text) {
            1 + shift
        } else if frag.page == 1
            && frag.size > 0.0
            && self
                .stats
                .title_size
                .is_some_and(|t| (t - frag.size).abs() < 0.25 && t > self.stats.median_size)
        {
            1
        } else {
            2 + shift
        };
        level.clamp(1, 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> DocStats {
        DocStats {
            median_size: 12.0,
            title_size: Some(18.0),
        }
    }

    fn article(locale: Locale) -> Classifier {
        Classifier::new(locale, ContentKind::Article, stats())
    }

    #[test]
    fn numbered_section_is_a_level_one_title() {
        let c = article(Locale::En);
        let d = c.classify(&Fragment {
            y_rel: Some(0.1),
            size: 12.0,
            ..Fragment::text("1. Introduction")
        });
        assert_eq!(d.role, Role::Title { level: 1 });
        assert_eq!(d.scores.total(), 11.5);
    }

    #[test]
    fn larger_font_promotes_section_name() {
        let c = article(Locale::En);
        let d = c.classify(&Fragment {
            size: 16.0,
            y_rel: Some(0.1),
            page: 1,
            ..Fragment::text("Introduction")
        });
        assert_eq!(d.role, Role::Title { level: 1 });
    }

    #[test]
    fn prose_stays_paragraph() {
        let c = article(Locale::En);
        let d = c.classify(&Fragment {
            size: 12.0,
            y_rel: Some(0.12),
            ..Fragment::text("This is a paragraph")
        });
        assert_eq!(d.role, Role::Paragraph);
        assert!(d.scores.total() < TITLE_THRESHOLD);
    }

    #[test]
    fn vetoes_override_any_score() {
        let c = article(Locale::En);
        for text in ["Introduction.", "Resultados!", "Conclusion?", "Methods…"] {
            let d = c.classify(&Fragment {
                size: 30.0,
                bold: true,
                heading_hint: true,
                ..Fragment::text(text)
            });
            assert_eq!(d.veto, Some(Veto::SentenceEnd), "{text}");
            assert_eq!(d.role, Role::Paragraph);
        }
        let listed = c.classify(&Fragment {
            in_list: true,
            size: 20.0,
            ..Fragment::text("2. Methods")
        });
        assert_eq!(listed.veto, Some(Veto::InList));
    }

    #[test]
    fn portuguese_vocabulary() {
        let c = article(Locale::PtBr);
        let d = c.classify(&Fragment {
            size: 14.0,
            bold: true,
            ..Fragment::text("2.1 Metodologia")
        });
        assert_eq!(d.role, Role::Title { level: 2 });
        let prose = c.classify(&Fragment {
            size: 12.0,
            ..Fragment::text("os dados foram coletados e analisados")
        });
        assert_eq!(prose.role, Role::Paragraph);
    }

    #[test]
    fn book_levels_shift_except_chapters() {
        let c = Classifier::new(Locale::PtBr, ContentKind::Book, stats());
        assert_eq!(c.level(&Fragment::text("Capítulo 3 Origens")), 1);
        assert_eq!(c.level(&Fragment::text("Introdução")), 2);
        assert_eq!(c.level(&Fragment::text("3.2 Fontes")), 3);
        assert_eq!(c.level(&Fragment::text("Outros temas")), 3);
    }

    #[test]
    fn corrupt_fragments_are_repaired_or_dropped() {
        let c = article(Locale::En);
        let dropped = c.classify(&Fragment::text("\u{E001}\u{E002}\u{E003}a"));
        assert_eq!(dropped.role, Role::Dropped);
        let repaired = c.classify(&Fragment::text("Re\u{E001}sul\u{E002}\u{E003}\u{E004}ts"));
        assert_eq!(repaired.text, "Results");
    }

    #[test]
    fn text_only_title_test() {
        let c = Classifier::text_only(Locale::En);
        assert!(c.looks_like_title("1. Introduction"));
        assert!(!c.looks_like_title("and the results were good"));
    }
}
