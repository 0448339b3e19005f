//! Post-processing: deterministic cleanup of the arbitrated Markdown.
//!
//! ## Why is post-processing necessary?
//!
//! Assembly and strategy rewriting work line by line and leave structural
//! debris behind: stray blank runs, headings glued to the paragraph above,
//! table blocks whose separator row went missing when a page break split
//! them, image links whose target was never written. Each rule here is a
//! pure `&str → String` pass that fixes one such artefact without touching
//! content.
//!
//! ## Rule Order
//!
//! Line endings are normalised before trimming, invisible characters go
//! before heading detection so `\u{FEFF}# Title` is seen as a heading, and
//! blank lines are collapsed last because the heading and table rules may
//! add some.

use super::detect::{is_table_row, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;

/// The cleanup stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleanup;

impl MarkdownRewrite for Cleanup {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn rewrite(&self, markdown: &str, _lex: &Lexicon) -> Rewritten {
        let rules: [fn(&str) -> String; 8] = [
            normalise_line_endings,
            remove_invisible_chars,
            trim_trailing_whitespace,
            remove_empty_headings,
            normalise_heading_spacing,
            fix_broken_tables,
            remove_mid_table_separators,
            remove_dangling_images,
        ];
        let mut text = markdown.to_string();
        let mut changes = 0;
        for rule in rules {
            let next = rule(&text);
            if next != text {
                changes += 1;
                text = next;
            }
        }
        let collapsed = collapse_blank_lines(&text);
        if collapsed != text {
            changes += 1;
        }
        Rewritten {
            text: collapsed,
            changes,
        }
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop headings with no text ───────────────────────────────────────

static RE_EMPTY_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s*$").unwrap());

fn remove_empty_headings(input: &str) -> String {
    input
        .lines()
        .filter(|line| !RE_EMPTY_HEADING.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Normalise heading spacing ────────────────────────────────────────

/// One blank line before and after every heading (outside code fences).
fn normalise_heading_spacing(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut after_heading = false;
    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = !in_fence && super::detect::is_heading(line);
        if after_heading && !line.is_empty() {
            out.push("");
        }
        if heading && out.last().is_some_and(|l| !l.is_empty()) {
            out.push("");
        }
        out.push(line);
        after_heading = heading;
    }
    out.join("\n")
}

// ── Rule 6: Fix broken GFM tables ───────────────────────────────────────────

/// A table block (consecutive `|` rows) must have a separator as its second
/// row.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());
        let starts_block = is_table_row(line)
            && !is_separator_row(line)
            && !lines.get(i.wrapping_sub(1)).is_some_and(|p| i > 0 && is_table_row(p));
        let next = lines.get(i + 1).copied().unwrap_or("");
        if starts_block && is_table_row(next) && !is_separator_row(next) {
            let col_count = line.trim().matches('|').count().saturating_sub(1).max(1);
            let sep: String = std::iter::once("|")
                .chain(std::iter::repeat_n("---|", col_count))
                .collect();
            result.push(sep);
        }
    }

    result.join("\n")
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 7: Remove spurious mid-table separator rows ───────────────────────
//
// GFM only allows a separator in position 2 (after the header row). A table
// split across pages and glued back together carries a second one.

fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 8: Remove dangling image links ──────────────────────────────────────
//
// Keep `![alt](target)` when the target is an extracted image, a data URI,
// or an absolute URL. Anything else (empty target, bare file name) becomes an
// italic caption so the text is not lost.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn is_resolvable_target(url: &str) -> bool {
    let u = url.trim();
    u.starts_with("./images/")
        || u.starts_with("images/")
        || u.starts_with("data:image/")
        || u.starts_with("http://")
        || u.starts_with("https://")
}

fn remove_dangling_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if is_resolvable_target(&caps[2]) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .to_string()
}

// ── Rule 9: Collapse blank runs ─────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && line.is_empty() && out.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("\na\n\n\n\n\nb\n\n"), "a\n\nb");
        assert_eq!(collapse_blank_lines("```\n\n\n```"), "```\n\n\n```");
    }

    #[test]
    fn test_heading_spacing() {
        let input = "some text\n# Heading\nmore text";
        assert_eq!(
            normalise_heading_spacing(input),
            "some text\n\n# Heading\n\nmore text"
        );
    }

    #[test]
    fn test_heading_spacing_ignores_fenced_comments() {
        let input = "```python\n# comment\nx = 1\n```";
        assert_eq!(normalise_heading_spacing(input), input);
    }

    #[test]
    fn test_empty_heading_removed() {
        assert_eq!(remove_empty_headings("#\n## \ntext"), "text");
    }

    #[test]
    fn test_fix_broken_table() {
        let input = "| A | B |\n| 1 | 2 |";
        let result = fix_broken_tables(input);
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]));
    }

    #[test]
    fn test_table_with_separator_unchanged() {
        let input = "| A | B |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(fix_broken_tables(input), input);
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_dangling_image_becomes_caption() {
        let result = remove_dangling_images("Some text\n![Chart Title](chart.png)\nMore text");
        assert!(!result.contains("!["));
        assert!(result.contains("*Chart Title*"));
    }

    #[test]
    fn test_extracted_images_kept() {
        let input = "![imagem_1.png](./images/imagem_1.png)";
        assert_eq!(remove_dangling_images(input), input);
        let inline = "![imagem_2.png](data:image/png;base64,AAAA)";
        assert_eq!(remove_dangling_images(inline), inline);
    }

    #[test]
    fn test_remove_mid_table_separator() {
        let input = "| A | B |\n|---|---|\n| 1 | 2 |\n|---|---|\n| 3 | 4 |";
        let result = remove_mid_table_separators(input);
        let sep_count = result.lines().filter(|l| is_separator_row(l)).count();
        assert_eq!(sep_count, 1, "Only one separator should remain");
        assert!(result.contains("| 3 | 4 |"));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let input = "# Title\r\nSome text   \n\n\n\n## Section\n| A | B |\n| 1 | 2 |";
        let lex = crate::lexicon::lexicon(crate::config::Locale::En);
        let once = Cleanup.rewrite(input, lex);
        assert!(once.changes > 0);
        let twice = Cleanup.rewrite(&once.text, lex);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.changes, 0);
        assert_eq!(
            once.text,
            "# Title\n\nSome text\n\n## Section\n\n| A | B |\n|---|---|\n| 1 | 2 |"
        );
    }
}
