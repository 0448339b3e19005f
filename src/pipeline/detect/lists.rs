//! List detection and normalisation.
//!
//! Bullets of any shape become `-`, numbered items keep their number with a
//! `.` delimiter, and lettered items become bullets that keep their letter
//! (`- a. …`). Nesting follows indentation; a lettered item at the same
//! indentation as a preceding numbered item nests under it. Each nesting
//! level is written [`LEVEL_INDENT`] spaces deeper than its parent, whatever
//! the parent's marker.
//!
//! A run of items absorbs the lines that continue an item (the item does not
//! end a sentence, or the line starts lowercase). Blank lines are put around
//! each run so surrounding prose does not become a lazy continuation.

use super::{fenced_mask, is_heading, is_table_row, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use crate::pipeline::classify::{ends_sentence, list_marker, ListMarker};
use crate::pipeline::fusion::repair_hyphen;

/// Output indentation per nesting level.
pub const LEVEL_INDENT: usize = 2;

/// The list detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lists;

/// One open nesting level.
struct Level {
    /// Indentation in the input.
    source: usize,
    /// Indentation written to the output.
    out: usize,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blocking(line: &str) -> bool {
    let t = line.trim_start();
    is_heading(line)
        || is_table_row(line)
        || t.starts_with('>')
        || t.starts_with("![")
        || t.starts_with("[^")
        || t.starts_with("<a ")
}

fn append(item: &mut String, line: &str) {
    let line = line.trim();
    if item.ends_with('-') {
        if let Some(joined) = repair_hyphen(item, line) {
            *item = joined;
            return;
        }
    }
    item.push(' ');
    item.push_str(line);
}

impl MarkdownRewrite for Lists {
    fn name(&self) -> &'static str {
        "lists"
    }

    fn rewrite(&self, markdown: &str, _lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut changes = 0usize;

        let mut stack: Vec<Level> = Vec::new();
        let mut in_run = false;
        let mut last_ordered_indent: Option<usize> = None;

        for (i, &line) in lines.iter().enumerate() {
            let marker = (!fenced[i] && !is_blocking(line))
                .then(|| list_marker(line))
                .flatten();

            if let Some((kind, body_at)) = marker {
                if !in_run && out.last().is_some_and(|l| !l.trim().is_empty()) {
                    out.push(String::new());
                    changes += 1;
                }
                let trimmed = line.trim_start();
                let body = &trimmed[body_at..];
                let mut indent = indent_of(line);
                if kind == ListMarker::Letter && last_ordered_indent.is_some_and(|o| o >= indent) {
                    indent = last_ordered_indent.map_or(indent, |o| o + 1);
                }

                while stack.last().is_some_and(|top| indent < top.source) {
                    stack.pop();
                }
                let marker_text = match kind {
                    ListMarker::Ordered(n) => format!("{n}."),
                    ListMarker::Bullet | ListMarker::Letter => "-".to_string(),
                };
                let text = match kind {
                    ListMarker::Letter => trimmed.to_string(),
                    _ => body.to_string(),
                };
                let out_indent = match stack.last() {
                    Some(top) if top.source == indent => {
                        let out = top.out;
                        stack.pop();
                        out
                    }
                    Some(top) => top.out + LEVEL_INDENT,
                    None => 0,
                };
                stack.push(Level {
                    source: indent,
                    out: out_indent,
                });
                if let ListMarker::Ordered(_) = kind {
                    last_ordered_indent = Some(indent_of(line));
                }

                let rendered = format!("{}{} {}", " ".repeat(out_indent), marker_text, text.trim());
                if rendered != line {
                    changes += 1;
                }
                out.push(rendered);
                in_run = true;
                continue;
            }

            if in_run {
                let continues = !fenced[i]
                    && !line.trim().is_empty()
                    && !is_blocking(line)
                    && out.last().is_some_and(|item| {
                        !ends_sentence(item)
                            || line.trim_start().chars().next().is_some_and(char::is_lowercase)
                    });
                if continues {
                    if let Some(item) = out.last_mut() {
                        append(item, line);
                        changes += 1;
                    }
                    continue;
                }
                in_run = false;
                stack.clear();
                last_ordered_indent = None;
                if !line.trim().is_empty() {
                    out.push(String::new());
                    changes += 1;
                }
            }
            out.push(line.to_string());
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
        Lists.rewrite(md, lexicon(Locale::En)).text
    }

    #[test]
    fn bullets_are_normalised() {
        assert_eq!(run("• first\n▪ second"), "- first\n- second");
    }

    #[test]
    fn ordered_items_keep_numbers() {
        assert_eq!(run("1) one\n2) two"), "1. one\n2. two");
    }

    #[test]
    fn letters_nest_under_numbers() {
        assert_eq!(
            run("1. Choose a sample\na. dry it\nb. weigh it\n2. Record the mass"),
            "1. Choose a sample\n  - a. dry it\n  - b. weigh it\n2. Record the mass"
        );
    }

    #[test]
    fn indentation_nests_bullets() {
        assert_eq!(run("- top\n    - child\n- next"), "- top\n  - child\n- next");
    }

    #[test]
    fn every_level_is_two_spaces_deeper() {
        assert_eq!(
            run("10. Parent\n    - child\n        - grandchild\n11. Next"),
            "10. Parent\n  - child\n    - grandchild\n11. Next"
        );
    }

    #[test]
    fn continuations_join_the_item() {
        assert_eq!(
            run("- an item that wraps\nonto a second line\n- another"),
            "- an item that wraps onto a second line\n- another"
        );
    }

    #[test]
    fn runs_are_separated_from_prose() {
        assert_eq!(
            run("Intro text:\n- a point.\nNext paragraph starts here."),
            "Intro text:\n\n- a point.\n\nNext paragraph starts here."
        );
    }

    #[test]
    fn headings_tables_and_fences_are_left_alone() {
        let md = "# 1. Introduction\n\n| - | x |\n\n```\n- not a list\n```";
        assert_eq!(run(md), md);
    }

    #[test]
    fn idempotent() {
        let md = "Intro:\n• one that\ncontinues\n1. first\na. sub\n2. second\nAfter.";
        let once = run(md);
        assert_eq!(run(&once), once);
        let again = Lists.rewrite(&once, lexicon(Locale::En));
        assert_eq!(again.changes, 0);
    }
}
