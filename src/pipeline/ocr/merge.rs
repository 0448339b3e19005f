//! Combining OCR text with the embedded text layer.

use crate::text::line_key;
use std::collections::HashSet;
use strsim::normalized_levenshtein;

/// Similarity above which two normalised lines are the same line.
pub const NEAR_DUPLICATE: f64 = 0.9;

fn present(key: &str, embedded_keys: &[String], blob: &str) -> bool {
    blob.contains(key)
        || embedded_keys
            .iter()
            .any(|e| normalized_levenshtein(key, e) > NEAR_DUPLICATE)
}

/// Embedded text with the OCR lines it lacks spliced in.
///
/// Each missing OCR line is placed after the embedded line matching the
/// nearest preceding OCR line that both texts share; lines with no such
/// anchor go first.
pub fn anchored_union(embedded: &str, ocr: &str) -> String {
    let base: Vec<&str> = embedded.lines().collect();
    let keys: Vec<String> = base.iter().map(|l| line_key(l)).collect();
    let embedded_keys: Vec<String> = keys.iter().filter(|k| !k.is_empty()).cloned().collect();
    let blob = embedded_keys.join(" ");

    let mut leading: Vec<&str> = Vec::new();
    let mut after: Vec<Vec<&str>> = vec![Vec::new(); base.len()];
    let mut anchor: Option<usize> = None;
    let mut added: HashSet<String> = HashSet::new();

    for line in ocr.lines() {
        let key = line_key(line);
        if key.is_empty() {
            continue;
        }
        if present(&key, &embedded_keys, &blob) {
            if let Some(pos) = keys
                .iter()
                .position(|k| *k == key || normalized_levenshtein(k, &key) > NEAR_DUPLICATE)
            {
                anchor = Some(pos);
            }
            continue;
        }
        if !added.insert(key) {
            continue;
        }
        match anchor {
            Some(pos) => after[pos].push(line.trim()),
            None => leading.push(line.trim()),
        }
    }

    let mut out: Vec<&str> = leading;
    for (line, extra) in base.into_iter().zip(after) {
        out.push(line);
        out.extend(extra);
    }
    out.join("\n")
}

/// Collapse near-identical consecutive lines, then drop any run of three
/// lines that repeats an earlier run.
pub fn dedup(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let key = line_key(line);
        let repeat = !key.is_empty()
            && lines
                .last()
                .is_some_and(|prev| normalized_levenshtein(&line_key(prev), &key) > NEAR_DUPLICATE);
        if !repeat {
            lines.push(line);
        }
    }

    let keys: Vec<String> = lines.iter().map(|l| line_key(l)).collect();
    let mut seen: HashSet<[&str; 3]> = HashSet::new();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if i + 3 <= lines.len() && keys[i..i + 3].iter().all(|k| !k.is_empty()) {
            let triple = [keys[i].as_str(), keys[i + 1].as_str(), keys[i + 2].as_str()];
            if !seen.insert(triple) {
                i += 3;
                continue;
            }
        }
        out.push(lines[i]);
        i += 1;
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_splices_missing_lines_after_anchor() {
        let embedded = "Alpha line one\nGamma line three";
        let ocr = "Alpha line one\nBeta line two\nGamma line three";
        assert_eq!(
            anchored_union(embedded, ocr),
            "Alpha line one\nBeta line two\nGamma line three"
        );
    }

    #[test]
    fn union_ignores_near_duplicates() {
        let embedded = "The quick brown fox jumps";
        let ocr = "The quick brovvn fox jumps\nA new sentence entirely";
        assert_eq!(
            anchored_union(embedded, ocr),
            "The quick brown fox jumps\nA new sentence entirely"
        );
    }

    #[test]
    fn union_without_anchor_prepends() {
        assert_eq!(anchored_union("", "Only OCR text"), "Only OCR text");
        assert_eq!(anchored_union("kept", "new first"), "new first\nkept");
    }

    #[test]
    fn dedup_collapses_consecutive_near_identical() {
        assert_eq!(
            dedup("Results are shown below\nResults are shown be1ow\nNext"),
            "Results are shown below\nNext"
        );
    }

    #[test]
    fn dedup_removes_repeated_triples() {
        let text = "one\ntwo\nthree\nfour\none\ntwo\nthree\nfive";
        assert_eq!(dedup(text), "one\ntwo\nthree\nfour\nfive");
    }

    #[test]
    fn dedup_keeps_blank_separated_text() {
        let text = "a para\n\nanother para";
        assert_eq!(dedup(text), text);
    }
}
