//! Strategy arbitration: several reformattings of the first pass compete on
//! a structural-quality score, and the winner alone goes through paragraph
//! fusion.
//!
//! ## Why arbitrate before fusing?
//!
//! Fusing first and then reformatting undoes fusion decisions (a strategy
//! that splits blocks re-breaks joined paragraphs). Scoring the unfused
//! candidates and fusing once afterwards keeps the two steps from fighting.
//!
//! ## Strategies
//!
//! | name        | rewrite                                                     |
//! |-------------|-------------------------------------------------------------|
//! | current     | none                                                        |
//! | intelligent | rejoins blocks split mid-sentence, within one section       |
//! | structured  | one line per plain block, headings untouched                |
//! | compact     | merges split titles and blocks that do not end a sentence   |
//! | clean       | drops repeated lines and fragments of the previous line     |
//! | academic    | promotes section keywords to `##`                           |
//! | minimal     | drops stray short lines, joins lines until a sentence ends  |
//!
//! Oversized inputs only try `compact`, `clean` and `minimal`.

use super::classify::{ends_sentence, list_marker};
use super::context::{ConversionContext, Field};
use super::detect::{fenced_mask, heading_parts, is_fence, is_table_row};
use super::fusion::{is_structural, repair_hyphen, Fusion};
use super::{require, Stage, StageEnv, StageReport};
use crate::error::{StageError, StrategyError};
use crate::lexicon::{lexicon, strip_numbering, Lexicon};
use crate::text::{line_key, word_count, words};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

// ── Scoring constants ────────────────────────────────────────────────────

const TITLE_WEIGHT: f64 = 2.0;
const TITLE_CAP: f64 = 30.0;
const PARAGRAPH_MIN_WORDS: usize = 5;
const KEYWORD_HEADING_BONUS: f64 = 3.0;
const BREAK_PENALTY: f64 = 0.5;
const REPEAT_PENALTY: f64 = 2.0;
/// Repeated lines beyond this many cost [`EXCESS_REPEAT_PENALTY`] more each.
const REPEAT_SOFT_LIMIT: usize = 10;
const EXCESS_REPEAT_PENALTY: f64 = 5.0;
/// Most frequent word share (≥ 4 letters) tolerated before penalties.
const WORD_FREQ_LIMIT: f64 = 0.05;
const WORD_FREQ_PENALTY: f64 = 100.0;
const MIN_WORDS_FOR_FREQ: usize = 50;
const DENSITY_HIGH: f64 = 0.95;
const DENSITY_BONUS: f64 = 5.0;
const DENSITY_LOW: f64 = 0.7;
const DENSITY_PENALTY: f64 = 20.0;
const HEADER_PHRASE_LIMIT: usize = 5;
const HEADER_PHRASE_PENALTY: f64 = 50.0;
const RICHNESS_WEIGHT: f64 = 1.5;
const CLEAN_REPEAT_BONUS: f64 = 0.5;

/// Lines shorter than this are dropped by `minimal`.
const MIN_LINE_CHARS: usize = 3;
/// Keyword lines longer than this are not promoted by `academic`.
const MAX_PROMOTED_WORDS: usize = 6;
/// Fragments shorter than this are not compared by `clean`.
const MIN_FRAGMENT_KEY: usize = 10;

// ── Strategies ───────────────────────────────────────────────────────────

/// A formatting policy competing in arbitration. Declaration order breaks
/// score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Current,
    Intelligent,
    Structured,
    Compact,
    Clean,
    Academic,
    Minimal,
}

impl Strategy {
    pub const ALL: [Strategy; 7] = [
        Strategy::Current,
        Strategy::Intelligent,
        Strategy::Structured,
        Strategy::Compact,
        Strategy::Clean,
        Strategy::Academic,
        Strategy::Minimal,
    ];

    /// Candidates considered when the input exceeds the size threshold.
    pub const OVERSIZE: [Strategy; 3] = [Strategy::Compact, Strategy::Clean, Strategy::Minimal];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Current => "current",
            Strategy::Intelligent => "intelligent",
            Strategy::Structured => "structured",
            Strategy::Compact => "compact",
            Strategy::Clean => "clean",
            Strategy::Academic => "academic",
            Strategy::Minimal => "minimal",
        }
    }

    pub fn candidates(oversize: bool) -> &'static [Strategy] {
        if oversize {
            &Self::OVERSIZE
        } else {
            &Self::ALL
        }
    }

    /// Reformat `markdown`. Empty output from non-empty input is an error.
    pub fn apply(self, markdown: &str, lex: &Lexicon) -> Result<String, StrategyError> {
        let out = match self {
            Strategy::Current => markdown.to_string(),
            Strategy::Intelligent => intelligent(markdown),
            Strategy::Structured => structured(markdown),
            Strategy::Compact => compact(markdown, lex),
            Strategy::Clean => clean(markdown),
            Strategy::Academic => academic(markdown, lex),
            Strategy::Minimal => minimal(markdown),
        };
        if out.trim().is_empty() && !markdown.trim().is_empty() {
            return Err(StrategyError::EmptyOutput {
                strategy: self.name(),
            });
        }
        Ok(out)
    }
}

/// A blank-line-separated block.
struct Block<'a> {
    lines: Vec<&'a str>,
    /// Only prose lines: no headings, lists, tables, quotes, fences, images.
    plain: bool,
}

fn split_blocks(markdown: &str) -> Vec<Block<'_>> {
    let lines: Vec<&str> = markdown.lines().collect();
    let fenced = fenced_mask(&lines);
    let mut blocks = Vec::new();
    let mut current = Block {
        lines: Vec::new(),
        plain: true,
    };
    for (&line, in_fence) in lines.iter().zip(fenced) {
        if line.trim().is_empty() && !in_fence {
            if !current.lines.is_empty() {
                blocks.push(std::mem::replace(
                    &mut current,
                    Block {
                        lines: Vec::new(),
                        plain: true,
                    },
                ));
            }
            continue;
        }
        current.plain &= !in_fence && !is_structural(line);
        current.lines.push(line);
    }
    if !current.lines.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Join prose lines into one, repairing hyphenated breaks.
fn join_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        let line = line.trim();
        if out.is_empty() {
            out.push_str(line);
        } else if let Some(joined) = out.ends_with('-').then(|| repair_hyphen(&out, line)).flatten() {
            out = joined;
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

fn starts_lowercase(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(char::is_lowercase)
}

fn intelligent(markdown: &str) -> String {
    let mut out: Vec<(String, bool)> = Vec::new();
    for block in split_blocks(markdown) {
        let text = block.lines.join("\n");
        if let Some((prev, prev_plain)) = out.last_mut() {
            let last = prev.lines().last().unwrap_or("");
            let continues = *prev_plain
                && block.plain
                && !ends_sentence(last)
                && block.lines.first().is_some_and(|l| starts_lowercase(l));
            if continues {
                prev.push('\n');
                prev.push_str(&text);
                continue;
            }
        }
        out.push((text, block.plain));
    }
    out.into_iter()
        .map(|(t, _)| t)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn structured(markdown: &str) -> String {
    split_blocks(markdown)
        .iter()
        .map(|b| {
            if b.plain {
                join_lines(&b.lines)
            } else {
                b.lines.join("\n")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn mergeable_titles(prev: &str, cur: &str, prev_level: usize, level: usize, lex: &Lexicon) -> bool {
    prev_level == level
        && !ends_sentence(prev)
        && !prev.ends_with(':')
        && !lex.is_section_name(prev)
        && !lex.is_section_name(cur)
        && strip_numbering(cur) == cur.trim()
}

fn compact(markdown: &str, lex: &Lexicon) -> String {
    let mut out: Vec<(String, bool)> = Vec::new();
    for block in split_blocks(markdown) {
        let single_heading = (block.lines.len() == 1)
            .then(|| heading_parts(block.lines[0]))
            .flatten();
        if let Some((prev, prev_plain)) = out.last_mut() {
            if let (Some((level, cur)), Some((prev_level, prev_text))) =
                (single_heading, heading_parts(prev))
            {
                if mergeable_titles(prev_text, cur, prev_level, level, lex) {
                    *prev = format!("{} {} {}", "#".repeat(level), prev_text, cur);
                    continue;
                }
            }
            if *prev_plain && block.plain && !ends_sentence(prev) {
                let rest = join_lines(&block.lines);
                let joined = join_lines(&[prev.as_str(), rest.as_str()]);
                *prev = joined;
                continue;
            }
        }
        if block.plain {
            out.push((join_lines(&block.lines), true));
        } else {
            out.push((block.lines.join("\n"), false));
        }
    }
    out.into_iter()
        .map(|(t, _)| t)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn clean(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let fenced = fenced_mask(&lines);
    let mut seen: HashSet<String> = HashSet::new();
    let mut prev_key = String::new();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for (&line, in_fence) in lines.iter().zip(fenced) {
        if in_fence || line.trim().is_empty() || is_table_row(line) {
            out.push(line);
            continue;
        }
        let key = line_key(line);
        if key.is_empty() {
            out.push(line);
            continue;
        }
        if !seen.insert(key.clone()) {
            continue;
        }
        if key.len() >= MIN_FRAGMENT_KEY && prev_key.contains(&key) {
            continue;
        }
        out.push(line);
        prev_key = key;
    }
    out.join("\n")
}

fn academic(markdown: &str, lex: &Lexicon) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let fenced = fenced_mask(&lines);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (line, in_fence) in lines.iter().zip(fenced) {
        if in_fence {
            out.push(line.to_string());
            continue;
        }
        if let Some((level, text)) = heading_parts(line) {
            if level > 2 && lex.is_section_name(text) {
                out.push(format!("## {text}"));
            } else {
                out.push(line.to_string());
            }
            continue;
        }
        let t = line.trim();
        let promote = !is_structural(line)
            && word_count(t) <= MAX_PROMOTED_WORDS
            && !ends_sentence(t)
            && lex.is_section_name(t);
        if promote {
            if out.last().is_some_and(|l| !l.is_empty()) {
                out.push(String::new());
            }
            out.push(format!("## {t}"));
            out.push(String::new());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn minimal(markdown: &str) -> String {
    let filtered: String = markdown
        .lines()
        .filter(|l| {
            let t = l.trim();
            t.is_empty() || is_structural(l) || t.chars().count() >= MIN_LINE_CHARS
        })
        .collect::<Vec<_>>()
        .join("\n");
    split_blocks(&filtered)
        .iter()
        .map(|b| {
            if !b.plain {
                return b.lines.join("\n");
            }
            let mut paragraphs: Vec<Vec<&str>> = vec![Vec::new()];
            for &line in &b.lines {
                if let Some(cur) = paragraphs.last_mut() {
                    cur.push(line);
                }
                if ends_sentence(line) {
                    paragraphs.push(Vec::new());
                }
            }
            paragraphs
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| join_lines(p))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Scoring ──────────────────────────────────────────────────────────────

/// Non-blank lines (outside tables) whose normalised form appeared before.
pub fn repetition_count(markdown: &str) -> usize {
    let mut seen = HashSet::new();
    markdown
        .lines()
        .filter(|l| !l.trim().is_empty() && !is_table_row(l) && !is_fence(l))
        .map(line_key)
        .filter(|k| !k.is_empty())
        .filter(|k| !seen.insert(k.clone()))
        .count()
}

/// Content lines plus single separating blanks, over all lines.
pub fn content_density(markdown: &str) -> f64 {
    let lines: Vec<&str> = markdown.lines().collect();
    if lines.is_empty() {
        return 0.0;
    }
    let blank = |i: usize| lines[i].trim().is_empty();
    let useful = (0..lines.len())
        .filter(|&i| {
            !blank(i) || (i > 0 && i + 1 < lines.len() && !blank(i - 1) && !blank(i + 1))
        })
        .count();
    useful as f64 / lines.len() as f64
}

fn word_frequency_penalty(markdown: &str) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for w in words(markdown).filter(|w| w.chars().count() >= 4) {
        *counts.entry(w.to_lowercase()).or_default() += 1;
        total += 1;
    }
    if total < MIN_WORDS_FOR_FREQ {
        return 0.0;
    }
    let freq = counts.values().copied().max().unwrap_or(0) as f64 / total as f64;
    ((freq - WORD_FREQ_LIMIT).max(0.0)) * WORD_FREQ_PENALTY
}

fn header_phrase_penalty(markdown: &str, lex: &Lexicon) -> f64 {
    let keys: Vec<String> = markdown
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| format!(" {} ", line_key(l)))
        .collect();
    lex.header_phrases
        .iter()
        .map(|p| format!(" {} ", line_key(p)))
        .filter(|p| keys.iter().filter(|k| k.contains(p.as_str())).count() > HEADER_PHRASE_LIMIT)
        .count() as f64
        * HEADER_PHRASE_PENALTY
}

/// Structural-quality score of a candidate.
pub fn score(markdown: &str, lex: &Lexicon) -> f64 {
    let blocks = split_blocks(markdown);
    let mut titles = 0usize;
    let mut keyword_titles = 0usize;
    let mut paragraphs = 0usize;
    let mut breaks = 0usize;
    let mut kinds: HashSet<&'static str> = HashSet::new();

    for block in &blocks {
        if block.plain {
            kinds.insert("paragraph");
            let text = block.lines.join(" ");
            if word_count(&text) >= PARAGRAPH_MIN_WORDS && ends_sentence(&text) {
                paragraphs += 1;
            }
            breaks += block
                .lines
                .windows(2)
                .filter(|w| !ends_sentence(w[0]) && starts_lowercase(w[1]))
                .count();
            continue;
        }
        for line in &block.lines {
            let t = line.trim();
            if let Some((_, text)) = heading_parts(line) {
                titles += 1;
                kinds.insert("heading");
                if lex.is_section_name(text) {
                    keyword_titles += 1;
                }
            } else if t.starts_with('|') {
                kinds.insert("table");
            } else if t.starts_with('>') {
                kinds.insert("quote");
            } else if t.starts_with("![") {
                kinds.insert("image");
            } else if t.starts_with("```") {
                kinds.insert("code");
            } else if list_marker(t).is_some() {
                kinds.insert("list");
            }
        }
    }

    let repeats = repetition_count(markdown);
    let density = content_density(markdown);
    let mut total = (titles as f64 * TITLE_WEIGHT).min(TITLE_CAP)
        + paragraphs as f64
        + keyword_titles as f64 * KEYWORD_HEADING_BONUS
        - breaks as f64 * BREAK_PENALTY
        - repeats as f64 * REPEAT_PENALTY
        - repeats.saturating_sub(REPEAT_SOFT_LIMIT) as f64 * EXCESS_REPEAT_PENALTY
        - word_frequency_penalty(markdown)
        - header_phrase_penalty(markdown, lex)
        + kinds.len() as f64 * RICHNESS_WEIGHT;
    if density > DENSITY_HIGH {
        total += DENSITY_BONUS;
    } else if density < DENSITY_LOW {
        total -= DENSITY_PENALTY;
    }
    total
}

// ── Stage ────────────────────────────────────────────────────────────────

/// One scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub strategy: Strategy,
    pub markdown: String,
    pub score: f64,
}

/// Run and score every candidate strategy. Failing strategies are skipped.
pub fn arbitrate(markdown: &str, lex: &Lexicon, oversize: bool) -> Vec<Candidate> {
    let input_repeats = repetition_count(markdown);
    let mut scored = Vec::new();
    for &strategy in Strategy::candidates(oversize) {
        let result = catch_unwind(AssertUnwindSafe(|| strategy.apply(markdown, lex)));
        let out = match result {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                warn!(strategy = strategy.name(), error = %e, "strategy skipped");
                continue;
            }
            Err(_) => {
                warn!(strategy = strategy.name(), "strategy panicked; skipped");
                continue;
            }
        };
        let mut s = score(&out, lex);
        if strategy == Strategy::Clean {
            s += input_repeats as f64 * CLEAN_REPEAT_BONUS;
        }
        debug!(strategy = strategy.name(), score = s, bytes = out.len(), "strategy scored");
        scored.push(Candidate {
            strategy,
            markdown: out,
            score: s,
        });
    }
    scored
}

/// Highest score; the earlier candidate wins ties.
pub fn pick(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().fold(None, |best, c| match best {
        Some(b) if b.score >= c.score => Some(b),
        _ => Some(c),
    })
}

/// Arbitration followed by one fusion pass.
pub struct Rewrite;

impl Stage for Rewrite {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Markdown, Field::Strategy]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let markdown = require(ctx.markdown(), self.name(), Field::Markdown)?;
        let lex = lexicon(ctx.locale());
        let oversize = markdown.len() > env.config.oversize_threshold_bytes;
        let candidates = arbitrate(markdown, lex, oversize);
        let considered = candidates.len();
        let winner = pick(candidates)
            .ok_or_else(|| StageError::Internal("every strategy failed".into()))?;

        let fused = Fusion::new(ctx.locale()).fuse(&winner.markdown);
        let name = winner.strategy.name();
        ctx.set_markdown(fused);
        ctx.set_strategy(name.to_string());
        Ok(StageReport::done()
            .with_strategy(name)
            .with_note(format!(
                "score {:.1} among {considered} candidates{}",
                winner.score,
                if oversize { " (oversize)" } else { "" }
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentKind, ConversionConfig, Locale};
    use crate::source::MemorySource;

    fn en() -> &'static Lexicon {
        lexicon(Locale::En)
    }

    fn rewrite(markdown: &str, config: &ConversionConfig) -> (String, Option<String>) {
        let source = MemorySource::from_text("");
        let env = StageEnv {
            config,
            source: &source,
            ocr: None,
        };
        let mut ctx = ConversionContext::new("t", Locale::En, ContentKind::Article);
        ctx.set_markdown(markdown.to_string());
        let report = Rewrite.run(&mut ctx, &env).unwrap_or_default();
        (ctx.markdown().cloned().unwrap_or_default(), report.strategy)
    }

    #[test]
    fn tie_keeps_current() {
        let md = "# 1. Introduction\n\nThis is the first paragraph.";
        let (out, strategy) = rewrite(md, &ConversionConfig::default());
        assert_eq!(out, md);
        assert_eq!(strategy.as_deref(), Some("current"));
    }

    #[test]
    fn winner_is_fused_once() {
        let md = "# Results\n\nthe measured values were\nconsistently higher than expected.";
        let (out, _) = rewrite(md, &ConversionConfig::default());
        assert_eq!(
            out,
            "# Results\n\nthe measured values were consistently higher than expected."
        );
    }

    #[test]
    fn oversize_only_tries_three() {
        let config = ConversionConfig {
            oversize_threshold_bytes: 10,
            ..ConversionConfig::default()
        };
        let (_, strategy) = rewrite("# Title\n\nSome body text here.", &config);
        let name = strategy.unwrap_or_default();
        assert!(["compact", "clean", "minimal"].contains(&name.as_str()), "{name}");
        assert_eq!(arbitrate("x y z.", en(), true).len(), 3);
    }

    #[test]
    fn empty_output_is_a_strategy_error() {
        assert_eq!(
            Strategy::Minimal.apply("a\nb", en()),
            Err(StrategyError::EmptyOutput { strategy: "minimal" })
        );
        let names: Vec<_> = arbitrate("a\nb", en(), false)
            .iter()
            .map(|c| c.strategy)
            .collect();
        assert!(!names.contains(&Strategy::Minimal));
        assert_eq!(names[0], Strategy::Current);
    }

    #[test]
    fn pick_prefers_earlier_on_ties() {
        let c = |strategy, score| Candidate {
            strategy,
            markdown: String::new(),
            score,
        };
        let best = pick(vec![
            c(Strategy::Current, 1.0),
            c(Strategy::Clean, 3.0),
            c(Strategy::Minimal, 3.0),
        ]);
        assert_eq!(best.map(|b| b.strategy), Some(Strategy::Clean));
    }

    #[test]
    fn intelligent_rejoins_split_blocks() {
        let md = "# Methods\n\nthe samples were\n\ncollected in spring.\n\n# Results";
        assert_eq!(
            intelligent(md),
            "# Methods\n\nthe samples were\ncollected in spring.\n\n# Results"
        );
    }

    #[test]
    fn structured_makes_one_line_per_block() {
        let md = "# T\n\nline one\nline two.\n\n- item\n- item two";
        assert_eq!(structured(md), "# T\n\nline one line two.\n\n- item\n- item two");
    }

    #[test]
    fn compact_merges_split_titles() {
        let md = "# Deep Learning for\n\n# Cats and Dogs\n\nbody text";
        assert_eq!(compact(md, en()), "# Deep Learning for Cats and Dogs\n\nbody text");
        let md = "# 1. Introduction\n\n# 2. Methods";
        assert_eq!(compact(md, en()), md);
    }

    #[test]
    fn clean_drops_repeats_and_fragments() {
        let md = "Journal of Things\nbody line one\nJournal of Things\nthe full sentence here\nfull sentence here";
        assert_eq!(
            clean(md),
            "Journal of Things\nbody line one\nthe full sentence here"
        );
    }

    #[test]
    fn academic_promotes_keywords() {
        let md = "text before\nConclusion\ntext after";
        assert_eq!(
            academic(md, en()),
            "text before\n\n## Conclusion\n\ntext after"
        );
        assert_eq!(academic("#### Results", en()), "## Results");
    }

    #[test]
    fn minimal_drops_short_lines_and_joins() {
        let md = "an opening line\n5\nthat ends here. Next\none starts.";
        assert_eq!(minimal(md), "an opening line that ends here. Next one starts.");
    }

    #[test]
    fn density_counts_single_separators() {
        assert_eq!(content_density("a\n\nb"), 1.0);
        assert!((content_density("a\n\n\n\nb") - 0.4).abs() < 1e-9);
    }

    #[test]
    fn repeated_header_phrases_are_penalised() {
        let repeated = "Journal of Things vol 3\nbody.\n\n".repeat(6);
        let once = "Journal of Things vol 3\nbody.\n\n";
        assert!(score(&repeated, en()) < score(once, en()) - 40.0);
    }
}
