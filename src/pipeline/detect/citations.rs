//! Citations and bibliography.
//!
//! Runs only when the document has a bibliography heading. The heading is
//! normalised to the locale's references heading and every entry below it
//! becomes a list item carrying an anchor:
//!
//! ```text
//! [3] Doe, J. Title. 2019.          - <a id="ref-3"></a>[3] Doe, J. Title. 2019.
//! Smith, A. (2020). A study.        - <a id="ref-smith-2020"></a>Smith, A. (2020). A study.
//! ```
//!
//! In the text, `(Smith, 2020)`, `(Smith et al., 2020)` and `[3]` become
//! links to those anchors when the target entry exists. Entry ids are
//! numeric for numbered entries and `surname-year` otherwise.

use super::{fenced_mask, is_heading, MarkdownRewrite, Rewritten};
use crate::lexicon::Lexicon;
use crate::pipeline::fusion::repair_hyphen;
use crate::text::slug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const ANCHOR_PREFIX: &str = "- <a id=\"ref-";

static RE_NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[(\d{1,3})\]|(\d{1,3})\.)\s+\S").unwrap());
static RE_AUTHOR_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{Lu}][\p{L}'’-]+,\s").unwrap());
static RE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:1[6-9]|20)\d{2}[a-z]?)\b").unwrap());
static RE_ANCHORED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^- <a id="ref-([^"]+)"></a>"#).unwrap());
static RE_AUTHOR_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\(((\p{Lu}[\p{L}'’-]+)(?: et al\.| (?:and|&|e) \p{Lu}[\p{L}'’-]+)?,? ((?:1[6-9]|20)\d{2}[a-z]?))\)",
    )
    .unwrap()
});
static RE_NUMERIC_CITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d{1,3})\]").unwrap());

/// The citation detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Citations;

/// Anchor id (without the `ref-` prefix) for a bibliography entry.
pub fn entry_id(entry: &str) -> String {
    if let Some(caps) = RE_NUMBERED.captures(entry) {
        if let Some(n) = caps.get(1).or_else(|| caps.get(2)) {
            return n.as_str().to_string();
        }
    }
    let surname = entry
        .split([',', ' '])
        .find(|w| !w.is_empty())
        .map(slug)
        .unwrap_or_default();
    match RE_YEAR.captures(entry).and_then(|c| c.get(1)) {
        Some(year) if !surname.is_empty() => format!("{surname}-{}", year.as_str()),
        Some(year) => year.as_str().to_string(),
        None => surname,
    }
}

fn starts_entry(line: &str, prev_blank: bool) -> bool {
    prev_blank
        || line.starts_with(ANCHOR_PREFIX)
        || RE_NUMBERED.is_match(line)
        || RE_AUTHOR_START.is_match(line)
}

fn append(entry: &mut String, line: &str) {
    if entry.ends_with('-') {
        if let Some(joined) = repair_hyphen(entry, line) {
            *entry = joined;
            return;
        }
    }
    entry.push(' ');
    entry.push_str(line);
}

/// Format the entries of one bibliography section. Returns the formatted
/// lines and the ids they define.
fn format_entries(lines: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut entries: Vec<String> = Vec::new();
    let mut prev_blank = true;
    for &line in lines {
        let t = line.trim();
        if t.is_empty() {
            prev_blank = true;
            continue;
        }
        let t = if t.starts_with(ANCHOR_PREFIX) {
            t
        } else {
            t.strip_prefix("- ").unwrap_or(t)
        };
        match entries.last_mut() {
            Some(last) if !starts_entry(t, prev_blank) => append(last, t),
            _ => entries.push(t.to_string()),
        }
        prev_blank = false;
    }

    let mut ids: Vec<String> = Vec::with_capacity(entries.len());
    let mut seen: HashSet<String> = HashSet::new();
    let formatted = entries
        .into_iter()
        .map(|entry| {
            if let Some(caps) = RE_ANCHORED.captures(&entry) {
                let id = caps[1].to_string();
                seen.insert(id.clone());
                ids.push(id);
                return entry;
            }
            let base = entry_id(&entry);
            let mut id = base.clone();
            let mut n = 2;
            while !seen.insert(id.clone()) {
                id = format!("{base}-{n}");
                n += 1;
            }
            let line = format!("- <a id=\"ref-{id}\"></a>{entry}");
            ids.push(id);
            line
        })
        .collect();
    (formatted, ids)
}

fn link_citations(line: &str, ids: &HashSet<String>) -> (String, usize) {
    let mut changes = 0;
    let text = RE_AUTHOR_YEAR.replace_all(line, |caps: &regex::Captures<'_>| {
        let id = format!("{}-{}", slug(&caps[2]), &caps[3]);
        if ids.contains(&id) {
            changes += 1;
            format!("([{}](#ref-{id}))", &caps[1])
        } else {
            caps[0].to_string()
        }
    });
    let text = RE_NUMERIC_CITE
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            let nested = text[..start].ends_with('[') || text[end..].starts_with([']', '(']);
            if !nested && ids.contains(&caps[1]) {
                changes += 1;
                format!("[[{}]](#ref-{})", &caps[1], &caps[1])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    (text, changes)
}

impl MarkdownRewrite for Citations {
    fn name(&self) -> &'static str {
        "citations"
    }

    fn rewrite(&self, markdown: &str, lex: &Lexicon) -> Rewritten {
        let lines: Vec<&str> = markdown.lines().collect();
        let fenced = fenced_mask(&lines);
        let Some(start) =
            (0..lines.len()).find(|&i| !fenced[i] && lex.is_bibliography_heading(lines[i]))
        else {
            return Rewritten::unchanged(markdown);
        };
        let end = (start + 1..lines.len())
            .find(|&i| fenced[i] || is_heading(lines[i]))
            .unwrap_or(lines.len());

        let mut changes = 0;
        let heading = format!("## {}", lex.references_heading);
        if lines[start] != heading {
            changes += 1;
        }
        let (entries, ids) = format_entries(&lines[start + 1..end]);
        let original: Vec<&str> = lines[start + 1..end]
            .iter()
            .copied()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if entries.iter().map(String::as_str).ne(original.iter().copied()) {
            changes += 1;
        }
        let ids: HashSet<String> = ids.into_iter().collect();

        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        for (i, &line) in lines[..start].iter().enumerate() {
            if fenced[i] || is_heading(line) {
                out.push(line.to_string());
                continue;
            }
            let (text, n) = link_citations(line, &ids);
            changes += n;
            out.push(text);
        }
        while out.last().is_some_and(|l| l.trim().is_empty()) {
            out.pop();
        }
        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(heading);
        out.push(String::new());
        out.extend(entries);
        if end < lines.len() {
            out.push(String::new());
            out.extend(lines[end..].iter().map(|l| l.to_string()));
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
        Citations.rewrite(md, lexicon(Locale::En)).text
    }

    #[test]
    fn numeric_citations_link_to_entries() {
        let md = "As shown [1] and [4].\n\nBibliography\n[1] Doe, J. A title.\n2019.";
        assert_eq!(
            run(md),
            "As shown [[1]](#ref-1) and [4].\n\n## References\n\n- <a id=\"ref-1\"></a>[1] Doe, J. A title. 2019."
        );
    }

    #[test]
    fn author_year_citations() {
        let md = "Prior work (Smith et al., 2020) and (Jones, 2018).\n\n## References\n\nSmith, A., Lee, B. (2020). A study.\nBrown, C. (2001). Other.";
        let out = run(md);
        assert!(
            out.starts_with("Prior work ([Smith et al., 2020](#ref-smith-2020)) and (Jones, 2018)."),
            "{out}"
        );
        assert!(out.contains("- <a id=\"ref-smith-2020\"></a>Smith, A., Lee, B. (2020). A study."));
        assert!(out.contains("- <a id=\"ref-brown-2001\"></a>Brown, C. (2001). Other."));
    }

    #[test]
    fn portuguese_abnt() {
        let md = "Conforme (SILVA, 2019).\n\nREFERÊNCIAS\n\nSILVA, J. Título do livro. São Paulo, 2019.";
        let out = Citations.rewrite(md, lexicon(Locale::PtBr)).text;
        assert_eq!(
            out,
            "Conforme ([SILVA, 2019](#ref-silva-2019)).\n\n## Referências\n\n- <a id=\"ref-silva-2019\"></a>SILVA, J. Título do livro. São Paulo, 2019."
        );
    }

    #[test]
    fn without_bibliography_nothing_changes() {
        let md = "Text [1] (Smith, 2020).";
        assert_eq!(run(md), md);
    }

    #[test]
    fn duplicate_ids_get_suffixes() {
        assert_eq!(entry_id("Smith, A. (2020). One."), "smith-2020");
        let (lines, ids) = format_entries(&["Smith, A. (2020). One.", "Smith, B. (2020). Two."]);
        assert_eq!(ids, vec!["smith-2020", "smith-2020-2"]);
        assert!(lines[1].starts_with("- <a id=\"ref-smith-2020-2\"></a>"));
    }

    #[test]
    fn idempotent() {
        let md = "See [2] and (Doe, 1999).\n\n## Bibliography\n\n[2] Roe, R. Paper.\nDoe, D. (1999). Book.\n\n## Notes\n\n[^1]: A note.";
        let once = run(md);
        assert_eq!(run(&once), once);
        assert_eq!(Citations.rewrite(&once, lexicon(Locale::En)).changes, 0);
        assert!(once.ends_with("## Notes\n\n[^1]: A note."));
    }
}
