//! Source-code detection.
//!
//! A block of two or more lines is code when at least [`CODE_FRACTION`] of
//! its lines carry a programming signal (statement terminators, braces,
//! operators, declarations). The block is wrapped in a fence tagged with the
//! language whose pattern bank matches most lines.

use super::{fenced_mask, is_heading, is_table_row, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;

/// Share of lines that must look like code.
pub const CODE_FRACTION: f64 = 0.6;
/// Shortest block considered.
const MIN_CODE_LINES: usize = 2;

static RE_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        [;{}]\s*$
        | ^\s*[{}]
        | =>|->|==|!=|::|\+\+|&&|\|\|
        | \w\(\)
        | ^\s*(def|class|import|from\s+\S+\s+import|return|fn|pub|let|const|var|function|public|private|static|void|int|\#include|SELECT|INSERT|UPDATE|elif|else:|for\s*\(|while\s*\(|if\s*\()\b
        | ^\s*[A-Za-z_][\w.]*\s*=\s*\S
        | ^\s*\$\s
        ",
    )
    .unwrap()
});

/// Signals that prose practically never carries. Lines matching these are
/// kept on their own line by paragraph fusion.
static RE_STRONG_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        [{}]\s*$
        | ^\s*[{}]
        | \w\([^)]*\)\s*;\s*$
        | ^\s*return\b[^.]*;\s*$
        | =>|::|==|!=|&&|\|\|
        | \w\(\)
        | ^\s*(def|fn|function)\s+\w+\s*\(
        | ^\s*(let|const|var)\s+(mut\s+)?\w+\s*(:\s*\S+\s*)?=
        | ^\s*\#include\b
        ",
    )
    .unwrap()
});

/// Language tags with the patterns that suggest them, most specific first.
static LANGUAGES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("rust", r"\bfn\s+\w+|let\s+mut\b|\bimpl\b|pub\s+fn|::new\("),
        ("python", r"^\s*def\s+\w+\(|^\s*import\s+\w+|\bself\.|\belif\b|print\(|:\s*$"),
        ("javascript", r"\bfunction\b|\bconst\s+\w+\s*=|=>|console\.log"),
        ("java", r"public\s+(static\s+)?(class|void)|System\.out|private\s+\w+"),
        ("c", r"#include|printf\(|int\s+main\s*\(|std::"),
        ("sql", r"(?i)^\s*(select|insert\s+into|update|delete\s+from|create\s+table)\b"),
        ("bash", r"^\s*\$\s|\becho\b|\bsudo\b|^\s*(cd|ls|export)\s"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

/// Whether a line carries a programming signal.
pub fn is_code_line(line: &str) -> bool {
    RE_SIGNAL.is_match(line)
}

/// Whether a line is code beyond reasonable doubt, even without its
/// neighbours.
pub fn is_strong_code_line(line: &str) -> bool {
    RE_STRONG_SIGNAL.is_match(line)
}

/// Whether a block of lines reads as source code.
pub fn looks_like_code(lines: &[&str]) -> bool {
    let content: Vec<&&str> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    if content.len() < MIN_CODE_LINES {
        return false;
    }
    let hits = content.iter().filter(|l| is_code_line(l)).count();
    hits as f64 / content.len() as f64 >= CODE_FRACTION
}

/// Best-matching language tag, or `""` when nothing matches.
pub fn guess_language(lines: &[&str]) -> &'static str {
    let mut best = ("", 0usize);
    for (name, re) in LANGUAGES.iter() {
        let hits = lines.iter().filter(|l| re.is_match(l)).count();
        if hits > best.1 {
            best = (name, hits);
        }
    }
    best.0
}

fn is_prose_block_line(line: &str) -> bool {
    let t = line.trim_start();
    !(is_heading(line)
        || is_table_row(line)
        || t.starts_with('>')
        || t.starts_with("![")
        || t.starts_with("[^")
        || t.starts_with("<a ")
        || t.starts_with("**Table")
        || t.starts_with("**Tabela"))
}

/// The code detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Code;

impl MarkdownRewrite for Code {
    fn name(&self) -> &'static str {
        "code"
    }

    fn rewrite(&self, markdown: &str, _lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut changes = 0;
        let mut i = 0;
        while i < lines.len() {
            let candidate = !fenced[i] && !lines[i].trim().is_empty() && is_prose_block_line(lines[i]);
            if !candidate {
                out.push(lines[i].to_string());
                i += 1;
                continue;
            }
            let start = i;
            while i < lines.len()
                && !fenced[i]
                && !lines[i].trim().is_empty()
                && is_prose_block_line(lines[i])
            {
                i += 1;
            }
            let block = &lines[start..i];
            if !looks_like_code(block) {
                out.extend(block.iter().map(|l| l.to_string()));
                continue;
            }
            let strip = block
                .iter()
                .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
                .min()
                .unwrap_or(0);
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            out.push(format!("```{}", guess_language(block)));
            out.extend(
                block
                    .iter()
                    .map(|l| l.chars().skip(strip).collect::<String>().trim_end().to_string()),
            );
            out.push("```".to_string());
            if lines.get(i).is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locale;
    use crate::lexicon::lexicon;

    fn run(md: &str) -> String {
        Code.rewrite(md, lexicon(Locale::En)).text
    }

    #[test]
    fn python_block_is_fenced() {
        let md = "Consider:\n\n    def area(r):\n        return 3.14 * r * r\n\nDone.";
        assert_eq!(
            run(md),
            "Consider:\n\n```python\ndef area(r):\n    return 3.14 * r * r\n```\n\nDone."
        );
    }

    #[test]
    fn rust_is_recognised() {
        assert_eq!(
            guess_language(&["fn main() {", "    let mut x = 1;", "}"]),
            "rust"
        );
        assert_eq!(guess_language(&["SELECT name", "FROM users;"]), "sql");
    }

    #[test]
    fn prose_is_not_code() {
        let md = "The results were clear.\nWe measured twice and compared.";
        assert_eq!(run(md), md);
        assert!(!looks_like_code(&["x = 1;"]));
    }

    #[test]
    fn wide_whitespace_indent_is_stripped_by_character() {
        let md = "Text.\n\n\u{3000}let x = compute();\n\u{a0}let y = x + 1;\n let z = y;\n\nEnd.";
        assert_eq!(
            run(md),
            "Text.\n\n```\nlet x = compute();\nlet y = x + 1;\nlet z = y;\n```\n\nEnd."
        );
    }

    #[test]
    fn idempotent() {
        let md = "int x = 0;\nx++;\nprintf(\"%d\", x);";
        let once = run(md);
        assert!(once.starts_with("```c\n"), "{once}");
        assert_eq!(run(&once), once);
    }
}
