//! Block-quote detection.
//!
//! Two shapes become `>` quotes: runs of at least two lines indented four or
//! more spaces that are neither list items nor code, and passages opening
//! with a quotation mark that close it before a blank line. An attribution
//! line (`— Name`) right after a quote is pulled into it. Headings, tables
//! and fences end every run.

use super::code::looks_like_code;
use super::{fenced_mask, is_fence, is_heading, is_table_row, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use crate::pipeline::classify::list_marker;

const MIN_INDENT: usize = 4;
const MIN_INDENTED_LINES: usize = 2;
/// Shortest quotation-mark passage treated as a quote rather than dialogue.
const MIN_QUOTE_CHARS: usize = 40;

const OPENING: &[char] = &['“', '"', '«'];
const CLOSING: &[char] = &['”', '"', '»'];

/// The quote detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quotes;

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_boundary(line: &str) -> bool {
    is_heading(line) || is_table_row(line) || is_fence(line)
}

fn is_attribution(t: &str) -> bool {
    t.starts_with('—') || t.starts_with('―') || t.starts_with("-- ")
}

fn closes(t: &str, first: bool) -> bool {
    let body = match t.chars().next() {
        Some(open) if first => &t[open.len_utf8()..],
        _ => t,
    };
    body.contains(CLOSING)
}

fn is_indented_prose(line: &str) -> bool {
    indent_of(line) >= MIN_INDENT && list_marker(line).is_none() && !is_boundary(line)
}

impl MarkdownRewrite for Quotes {
    fn name(&self) -> &'static str {
        "quotes"
    }

    fn rewrite(&self, markdown: &str, _lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut changes = 0;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let t = line.trim();
            if fenced[i] || t.is_empty() || t.starts_with('>') || is_boundary(line) {
                out.push(line.to_string());
                i += 1;
                continue;
            }

            let (mut end, quoted) = if is_indented_prose(line) {
                let mut j = i;
                while j < lines.len()
                    && !fenced[j]
                    && !lines[j].trim().is_empty()
                    && is_indented_prose(lines[j])
                {
                    j += 1;
                }
                let block = &lines[i..j];
                (j, block.len() >= MIN_INDENTED_LINES && !looks_like_code(block))
            } else if t.starts_with(OPENING) {
                let mut j = i;
                let mut closed = false;
                while j < lines.len() && !closed {
                    let lt = lines[j].trim();
                    if fenced[j]
                        || lt.is_empty()
                        || is_boundary(lines[j])
                        || (j > i && lt.starts_with('>'))
                    {
                        break;
                    }
                    closed = closes(lt, j == i);
                    j += 1;
                }
                let chars: usize = lines[i..j].iter().map(|l| l.trim().chars().count()).sum();
                (j, closed && chars >= MIN_QUOTE_CHARS)
            } else {
                (i + 1, false)
            };

            if !quoted {
                out.extend(lines[i..end].iter().map(|l| l.to_string()));
                i = end;
                continue;
            }

            if end < lines.len() && !fenced[end] && is_attribution(lines[end].trim()) {
                end += 1;
            }
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            out.extend(lines[i..end].iter().map(|l| format!("> {}", l.trim())));
            if lines.get(end).is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            changes += 1;
            i = end;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locale;
    use crate::lexicon::lexicon;

    fn run(md: &str) -> String {
        Quotes.rewrite(md, lexicon(Locale::En)).text
    }

    #[test]
    fn indented_block_becomes_quote() {
        let md = "Smith wrote:\n    Science is organized knowledge, and wisdom\n    is organized life.\nBack to prose.";
        assert_eq!(
            run(md),
            "Smith wrote:\n\n> Science is organized knowledge, and wisdom\n> is organized life.\n\nBack to prose."
        );
    }

    #[test]
    fn smart_quote_with_attribution() {
        let md = "“Imagination is more important than knowledge, for knowledge is limited.”\n— Albert Einstein\nNext.";
        assert_eq!(
            run(md),
            "> “Imagination is more important than knowledge, for knowledge is limited.”\n> — Albert Einstein\n\nNext."
        );
    }

    #[test]
    fn short_dialogue_is_not_a_quote() {
        let md = "“Yes,” she said.";
        assert_eq!(run(md), md);
    }

    #[test]
    fn headings_and_code_break_runs() {
        let md = "    indented line one\n# Heading\n    indented two";
        assert_eq!(run(md), md);
        let code = "    x = 1;\n    y = 2;";
        assert_eq!(run(code), code);
    }

    #[test]
    fn idempotent() {
        let md = "Intro.\n    First quoted line\n    second quoted line\n\"A long quotation that runs on for more than forty characters\"\n— Someone\nEnd.";
        let once = run(md);
        assert_eq!(run(&once), once);
        assert_eq!(Quotes.rewrite(&once, lexicon(Locale::En)).changes, 0);
    }
}
