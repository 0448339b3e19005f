//! Footnote detection.
//!
//! Definitions are lines opening with a superscript number, `[n]` or `(n)`
//! outside the bibliography, for which the text carries a matching mark.
//! They are lifted out of the text and collected under a notes heading at
//! the end of the document as `[^n]: …`. Numbered steps such as
//! `(1) Download the archive.` have no mark and stay where they are.
//!
//! References are rewritten to `[^n]`:
//!
//! - superscript digits after sentence punctuation always;
//! - superscript digits after a letter, and `[n]`/`(n)`, only when note `n`
//!   is defined. `m²` and `equation (2)` stay as they are otherwise.

use super::{fenced_mask, is_heading, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const SUPERSCRIPTS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
/// Punctuation after which a superscript is always a note mark.
const MARK_AFTER: &[char] = &['.', ',', ';', ':', ')', '”', '"', '’', '\''];

static RE_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[(\d{1,3})\]|\((\d{1,3})\))\s+(\S.*)$").unwrap());
static RE_BRACKET_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,3})\]|\((\d{1,3})\)").unwrap());

/// The footnote detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Footnotes;

fn sup_digit(c: char) -> Option<u32> {
    SUPERSCRIPTS.iter().position(|&s| s == c).map(|d| d as u32)
}

/// `"¹² text"` → `Some((12, "text"))`.
fn superscript_prefix(t: &str) -> Option<(u32, &str)> {
    let mut value = 0u32;
    let mut end = 0;
    for c in t.chars() {
        match sup_digit(c) {
            Some(d) => {
                value = value.checked_mul(10)?.checked_add(d)?;
                end += c.len_utf8();
            }
            None => break,
        }
    }
    if end == 0 {
        return None;
    }
    let rest = t[end..].trim_start();
    (!rest.is_empty()).then_some((value, rest))
}

/// Note number and text when `line` defines a footnote.
pub fn definition(line: &str) -> Option<(u32, &str)> {
    let t = line.trim();
    if t.starts_with("[^") {
        return None;
    }
    if let Some(def) = superscript_prefix(t) {
        return Some(def);
    }
    let caps = RE_DEFINITION.captures(t)?;
    let n = caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()?;
    let text = caps.get(3)?.as_str();
    Some((n, text))
}

fn rewrite_superscripts(line: &str, defined: &HashSet<u32>) -> (String, usize) {
    let mut out = String::with_capacity(line.len());
    let mut changes = 0;
    let mut prev: Option<char> = None;
    let mut chars = line.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if sup_digit(c).is_none() {
            out.push(c);
            prev = Some(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        let mut value = sup_digit(c).unwrap_or(0);
        while let Some(&(i, next)) = chars.peek() {
            let Some(d) = sup_digit(next) else { break };
            value = value.saturating_mul(10).saturating_add(d);
            end = i + next.len_utf8();
            chars.next();
        }
        let is_mark = prev.is_some_and(|p| {
            MARK_AFTER.contains(&p) || (p.is_alphabetic() && defined.contains(&value))
        });
        if is_mark {
            out.push_str(&format!("[^{value}]"));
            changes += 1;
        } else {
            out.push_str(&line[start..end]);
        }
        prev = line[start..end].chars().last();
    }
    (out, changes)
}

/// Note numbers `line` points at, whether or not they are defined.
fn marks_in(line: &str, marks: &mut HashSet<u32>) {
    let mut prev: Option<char> = None;
    let mut run: Option<u32> = None;
    let mut run_prev: Option<char> = None;
    for c in line.chars().chain(std::iter::once(' ')) {
        match sup_digit(c) {
            Some(d) => {
                if run.is_none() {
                    run_prev = prev;
                }
                run = Some(run.unwrap_or(0).saturating_mul(10).saturating_add(d));
            }
            None => {
                if let Some(value) = run.take() {
                    if run_prev.is_some_and(|p| MARK_AFTER.contains(&p) || p.is_alphabetic()) {
                        marks.insert(value);
                    }
                }
            }
        }
        prev = Some(c);
    }
    for caps in RE_BRACKET_REF.captures_iter(line) {
        let start = caps.get(0).map_or(0, |m| m.start());
        if start == 0 || line[..start].ends_with(['[', ']']) {
            continue;
        }
        if let Some(n) = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
        {
            marks.insert(n);
        }
    }
}

fn rewrite_brackets(line: &str, defined: &HashSet<u32>) -> (String, usize) {
    let mut changes = 0;
    let text = RE_BRACKET_REF
        .replace_all(line, |caps: &regex::Captures<'_>| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            let after_link = line[..start].ends_with(['[', ']']);
            let n: Option<u32> = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            match n {
                Some(n) if start > 0 && !after_link && defined.contains(&n) => {
                    changes += 1;
                    format!("[^{n}]")
                }
                _ => whole.to_string(),
            }
        })
        .into_owned();
    (text, changes)
}

impl MarkdownRewrite for Footnotes {
    fn name(&self) -> &'static str {
        "footnotes"
    }

    fn rewrite(&self, markdown: &str, lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);

        // Bibliography lines look like `[n]` definitions.
        let mut in_bibliography = vec![false; lines.len()];
        let mut inside = false;
        for (i, &line) in lines.iter().enumerate() {
            if !fenced[i] && is_heading(line) {
                inside = lex.is_bibliography_heading(line);
            } else if !fenced[i] && lex.is_bibliography_heading(line) {
                inside = true;
            }
            in_bibliography[i] = inside;
        }

        let eligible = |i: usize| !fenced[i] && !in_bibliography[i] && !is_heading(lines[i]);
        let mut marks: HashSet<u32> = HashSet::new();
        for (i, &line) in lines.iter().enumerate() {
            if eligible(i) {
                marks_in(definition(line).map_or(line, |(_, text)| text), &mut marks);
            }
        }

        let mut notes: Vec<(u32, String)> = Vec::new();
        let mut defined: HashSet<u32> = HashSet::new();
        let mut body: Vec<String> = Vec::with_capacity(lines.len());
        let mut changes = 0;

        for (i, &line) in lines.iter().enumerate() {
            let def = eligible(i)
                .then(|| definition(line))
                .flatten()
                .filter(|(n, _)| marks.contains(n));
            match def {
                Some((n, text)) if defined.insert(n) => {
                    notes.push((n, text.to_string()));
                    changes += 1;
                }
                Some((_, text)) => {
                    body.push(text.to_string());
                    changes += 1;
                }
                None => body.push(line.to_string()),
            }
        }

        let body_fenced = {
            let refs: Vec<&str> = body.iter().map(String::as_str).collect();
            fenced_mask(&refs)
        };
        let mut bib = false;
        for (line, &fence) in body.iter_mut().zip(&body_fenced) {
            if fence {
                continue;
            }
            if is_heading(line) {
                bib = lex.is_bibliography_heading(line);
                continue;
            }
            if bib || lex.is_bibliography_heading(line) {
                bib = true;
                continue;
            }
            let (sup, a) = rewrite_superscripts(line, &defined);
            let (text, b) = rewrite_brackets(&sup, &defined);
            if a + b > 0 {
                *line = text;
                changes += a + b;
            }
        }

        if changes == 0 {
            return Rewritten::unchanged(markdown);
        }
        if !notes.is_empty() {
            while body.last().is_some_and(|l| l.trim().is_empty()) {
                body.pop();
            }
            body.push(String::new());
            body.push(format!("## {}", lex.notes_heading));
            body.push(String::new());
            body.extend(notes.iter().map(|(n, text)| format!("[^{n}]: {text}")));
        }
        Rewritten {
            text: body.join("\n"),
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
        Footnotes.rewrite(md, lexicon(Locale::En)).text
    }

    #[test]
    fn superscript_notes_are_collected() {
        assert_eq!(
            run("Water boils at 100 °C.¹ More text.\n\n¹ At sea level."),
            "Water boils at 100 °C.[^1] More text.\n\n## Notes\n\n[^1]: At sea level."
        );
    }

    #[test]
    fn bracket_refs_need_a_definition() {
        assert_eq!(
            run("See note [2] here and [7] there.\n[2] The note."),
            "See note [^2] here and [7] there.\n\n## Notes\n\n[^2]: The note."
        );
    }

    #[test]
    fn exponents_and_bibliography_are_left_alone() {
        let md = "An area of 10² m and 3 cm² wide.";
        assert_eq!(run(md), md);
        let bib = "Text [1].\n\n## References\n\n[1] Smith, J. Title.";
        assert_eq!(run(bib), bib);
    }

    #[test]
    fn portuguese_heading() {
        let out = Footnotes
            .rewrite("Texto.¹\n¹ Nota de rodapé.", lexicon(Locale::PtBr))
            .text;
        assert!(out.ends_with("## Notas\n\n[^1]: Nota de rodapé."), "{out}");
    }

    #[test]
    fn numbered_steps_without_marks_stay_in_place() {
        let md = "Installation:\n\n(1) Download the archive from the site.\n\n(2) Extract it into a folder.";
        assert_eq!(run(md), md);
        let mixed = "Boiling point.¹\n(3) Download it.\n¹ At sea level.";
        assert_eq!(
            run(mixed),
            "Boiling point.[^1]\n(3) Download it.\n\n## Notes\n\n[^1]: At sea level."
        );
    }

    #[test]
    fn idempotent() {
        let once = run("A claim (1) and another.² Done.\n(1) First note.\n² Second note.");
        assert_eq!(run(&once), once);
        assert!(once.contains("A claim [^1] and another.[^2] Done."), "{once}");
    }
}
