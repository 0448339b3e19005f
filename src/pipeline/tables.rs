//! Tables: extraction, validation, Markdown rendering, and placement.
//!
//! Extraction takes the source's table candidates, or, when it offers none,
//! promotes runs of column-aligned lines found in the span layout. Every
//! candidate is validated (shape, fill, and text content), deduplicated, and
//! numbered in document order.
//!
//! Placement inserts each table after the paragraph that cites it
//! (`Table 2`, `Tabela 2`), else after the first paragraph that mentions a
//! table word, else at the end. Insertions run last-to-first so earlier
//! offsets stay valid, and a table whose caption is already present is not
//! inserted again.

use super::context::{ConversionContext, Field, Span, TableAnchor, TableCandidate};
use super::detect::{is_heading, is_table_row};
use super::layout::group_lines;
use super::{require, Metric, Stage, StageEnv, StageReport};
use crate::error::StageError;
use crate::lexicon::{lexicon, Lexicon};
use crate::source::{BoundingBox, RawTable};
use regex::Regex;
use tracing::debug;

/// Minimum share of non-empty cells.
const MIN_FILL_RATIO: f64 = 0.5;
/// Minimum share of non-empty cells carrying a letter.
const MIN_TEXT_RATIO: f64 = 0.3;
/// Horizontal gap, as a multiple of font size, that separates two cells.
const CELL_GAP: f32 = 1.5;
/// Consecutive aligned lines needed to call a run a table.
const MIN_ALIGNED_LINES: usize = 3;
/// Column start drift tolerated between aligned lines, in points.
const COLUMN_TOLERANCE: f32 = 12.0;

// ── Validation and rendering ─────────────────────────────────────────────

fn clean_cell(cell: &str) -> String {
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalise a raw matrix and decide whether it is a real table: at least
/// two rows and two columns, mostly filled, not purely numeric. Ragged rows
/// are padded and empty rows and columns removed.
pub fn validate_rows(rows: &[Vec<String>]) -> Option<Vec<Vec<String>>> {
    let mut rows: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.iter().map(|c| clean_cell(c)).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for r in &mut rows {
        r.resize(width, String::new());
    }
    let keep: Vec<bool> = (0..width)
        .map(|col| rows.iter().any(|r| !r[col].is_empty()))
        .collect();
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|r| {
            r.into_iter()
                .zip(&keep)
                .filter_map(|(c, k)| k.then_some(c))
                .collect()
        })
        .collect();

    let cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.len() < 2 || cols < 2 {
        return None;
    }
    let cells = (rows.len() * cols) as f64;
    let filled: Vec<&String> = rows.iter().flatten().filter(|c| !c.is_empty()).collect();
    if (filled.len() as f64) < cells * MIN_FILL_RATIO {
        return None;
    }
    let textual = filled
        .iter()
        .filter(|c| c.chars().any(char::is_alphabetic))
        .count();
    if (textual as f64) < filled.len() as f64 * MIN_TEXT_RATIO {
        return None;
    }
    Some(rows)
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
}

/// Render a validated table as a GFM pipe table. With `align`, every cell is
/// padded to its column width.
pub fn render_table(rows: &[Vec<String>], align: bool) -> String {
    let escaped: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.iter().map(|c| escape_cell(c)).collect())
        .collect();
    let cols = escaped.first().map(Vec::len).unwrap_or(0);
    let widths: Vec<usize> = (0..cols)
        .map(|i| {
            escaped
                .iter()
                .map(|r| r.get(i).map_or(0, |c| c.chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let render_row = |row: &Vec<String>| -> String {
        let cells: Vec<String> = (0..cols)
            .map(|i| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                if align {
                    let pad = widths[i].saturating_sub(cell.chars().count());
                    format!("{cell}{}", " ".repeat(pad))
                } else {
                    cell.to_string()
                }
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let separator = if align {
        let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        format!("| {} |", dashes.join(" | "))
    } else {
        format!("|{}", "---|".repeat(cols))
    };

    let mut lines = Vec::with_capacity(escaped.len() + 1);
    if let Some(header) = escaped.first() {
        lines.push(render_row(header));
        lines.push(separator);
    }
    lines.extend(escaped.iter().skip(1).map(render_row));
    lines.join("\n")
}

/// Caption line above a placed table.
pub fn caption(table: &TableCandidate) -> String {
    format!("**Table {}** ({})", table.number, page_label(table.page))
}

fn page_label(page: usize) -> String {
    format!("Page {page}")
}

// ── Geometry-derived candidates ──────────────────────────────────────────

struct Cell {
    left: f32,
    right: f32,
    text: String,
}

struct Row {
    cells: Vec<Cell>,
    top: f32,
    bottom: f32,
}

fn split_cells(line: &[&Span]) -> Row {
    let mut cells: Vec<Cell> = Vec::new();
    for span in line {
        let text = span.text.trim();
        match cells.last_mut() {
            Some(cell) if span.bbox.x0 - cell.right <= span.size.max(1.0) * CELL_GAP => {
                cell.text.push(' ');
                cell.text.push_str(text);
                cell.right = cell.right.max(span.bbox.x1);
            }
            _ => cells.push(Cell {
                left: span.bbox.x0,
                right: span.bbox.x1,
                text: text.to_string(),
            }),
        }
    }
    Row {
        cells,
        top: line.iter().map(|s| s.bbox.y0).fold(f32::MAX, f32::min),
        bottom: line.iter().map(|s| s.bbox.y1).fold(f32::MIN, f32::max),
    }
}

fn aligned(a: &Row, b: &Row) -> bool {
    a.cells.len() == b.cells.len()
        && a.cells
            .iter()
            .zip(&b.cells)
            .all(|(ca, cb)| (ca.left - cb.left).abs() <= COLUMN_TOLERANCE)
}

/// Box around every cell of a run of rows.
fn run_bbox(run: &[Row]) -> BoundingBox {
    let cells = || run.iter().flat_map(|r| r.cells.iter());
    BoundingBox::new(
        cells().map(|c| c.left).fold(f32::MAX, f32::min),
        run.iter().map(|r| r.top).fold(f32::MAX, f32::min),
        cells().map(|c| c.right).fold(f32::MIN, f32::max),
        run.iter().map(|r| r.bottom).fold(f32::MIN, f32::max),
    )
}

/// Runs of at least three column-aligned lines with two or more cells.
pub fn tables_from_spans(page: usize, spans: &[&Span]) -> Vec<RawTable> {
    let rows: Vec<Row> = group_lines(spans).iter().map(|l| split_cells(l)).collect();
    let mut out = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        if rows[start].cells.len() >= 2 {
            while end < rows.len() && aligned(&rows[start], &rows[end]) {
                end += 1;
            }
            if end - start >= MIN_ALIGNED_LINES {
                let run = &rows[start..end];
                out.push(RawTable {
                    page,
                    rows: run
                        .iter()
                        .map(|r| r.cells.iter().map(|c| c.text.clone()).collect())
                        .collect(),
                    bbox: Some(run_bbox(run)),
                });
                start = end;
                continue;
            }
        }
        start += 1;
    }
    out
}

// ── Stage: extract ───────────────────────────────────────────────────────

/// Collects and validates table candidates.
pub struct ExtractTables;

impl Stage for ExtractTables {
    fn name(&self) -> &'static str {
        "extract-tables"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Pages, Field::Spans]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Tables]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let mut raw = env
            .source
            .table_candidates()
            .map_err(|e| StageError::Source(e.to_string()))?;
        let from_geometry = raw.is_empty();
        if from_geometry {
            let pages: Vec<usize> = ctx
                .pages()
                .map(|p| p.iter().map(|p| p.number).collect())
                .unwrap_or_default();
            for page in pages {
                let spans: Vec<&Span> = ctx.page_spans(page).collect();
                raw.extend(tables_from_spans(page, &spans));
            }
        }

        let offered = raw.len();
        let mut tables: Vec<TableCandidate> = Vec::new();
        for t in raw {
            let Some(rows) = validate_rows(&t.rows) else {
                debug!(page = t.page, "table candidate rejected");
                continue;
            };
            if tables.iter().any(|k| k.rows == rows) {
                continue;
            }
            tables.push(TableCandidate {
                number: 0,
                page: t.page,
                rows,
                anchor: t.bbox.map(|b| TableAnchor {
                    y_top: b.y0,
                    y_bottom: b.y1,
                }),
            });
        }
        tables.sort_by(|a, b| {
            a.page.cmp(&b.page).then_with(|| {
                let ya = a.anchor.map_or(f32::MAX, |x| x.y_top);
                let yb = b.anchor.map_or(f32::MAX, |x| x.y_top);
                ya.total_cmp(&yb)
            })
        });
        for (i, t) in tables.iter_mut().enumerate() {
            t.number = i + 1;
        }

        let note = format!(
            "{} of {} candidates kept{}",
            tables.len(),
            offered,
            if from_geometry { " (layout)" } else { "" }
        );
        let report = if tables.is_empty() {
            StageReport::skipped(note)
        } else {
            StageReport::done().with_note(note)
        };
        ctx.set_tables(tables);
        Ok(report)
    }
}

// ── Stage: place ─────────────────────────────────────────────────────────

/// Byte ranges of the paragraph blocks of `markdown`, in order.
fn paragraph_blocks(markdown: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut start: Option<usize> = None;
    let mut end = 0;
    for line in markdown.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        if body.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push((s, end));
            }
        } else {
            start.get_or_insert(offset);
            end = offset + body.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        out.push((s, end));
    }
    out
}

fn is_prose_block(block: &str) -> bool {
    let first = block.lines().next().unwrap_or("");
    !is_heading(first) && !is_table_row(first) && !first.starts_with("**Table ")
}

/// Byte offset after which table `number` belongs.
fn anchor_offset(markdown: &str, number: usize, lex: &Lexicon) -> usize {
    let blocks = paragraph_blocks(markdown);
    let words: Vec<String> = lex
        .table_words
        .iter()
        .chain(["table"].iter())
        .map(|w| regex::escape(w))
        .collect();
    let alternation = words.join("|");
    let cited = Regex::new(&format!(r"(?i)\b(?:{alternation})\s+{number}\b")).ok();
    let mentioned = Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok();

    for pattern in [cited, mentioned].into_iter().flatten() {
        let hit = blocks.iter().find(|(s, e)| {
            let block = &markdown[*s..*e];
            is_prose_block(block) && pattern.is_match(block)
        });
        if let Some((_, e)) = hit {
            return *e;
        }
    }
    markdown.len()
}

/// Places validated tables into the Markdown.
pub struct PlaceTables;

impl Stage for PlaceTables {
    fn name(&self) -> &'static str {
        "place-tables"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let markdown = require(ctx.markdown(), self.name(), Field::Markdown)?;
        let tables = ctx.tables().cloned().unwrap_or_default();
        if tables.is_empty() {
            return Ok(StageReport::skipped("no tables"));
        }
        let lex = lexicon(ctx.locale());

        let mut inserts: Vec<(usize, usize, String)> = tables
            .iter()
            .filter(|t| !markdown.contains(&caption(t)))
            .map(|t| {
                let at = anchor_offset(markdown, t.number, lex);
                let block = format!(
                    "\n\n{}\n\n{}\n\n",
                    caption(t),
                    render_table(&t.rows, env.config.align_tables)
                );
                (at, t.number, block)
            })
            .collect();
        // Last-to-first; at a shared offset the higher number goes in first.
        inserts.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        let mut out = markdown.clone();
        for (at, number, block) in &inserts {
            debug!(table = number, offset = at, "placing table");
            out.insert_str(*at, block);
        }
        let placed = inserts.len();
        ctx.set_markdown(out);
        Ok(StageReport::done()
            .with_note(format!("{placed} tables placed"))
            .with_metric(Metric::TablesPlaced, placed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentKind, ConversionConfig, Locale};
    use crate::source::MemorySource;

    fn rows(m: &[&[&str]]) -> Vec<Vec<String>> {
        m.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn s2() -> Vec<Vec<String>> {
        rows(&[&["Col A", "Col B"], &["D1", "D2"], &["D3", "D4"]])
    }

    #[test]
    fn renders_gfm() {
        assert_eq!(
            render_table(&s2(), false),
            "| Col A | Col B |\n|---|---|\n| D1 | D2 |\n| D3 | D4 |"
        );
    }

    #[test]
    fn renders_aligned() {
        assert_eq!(
            render_table(&s2(), true),
            "| Col A | Col B |\n| ----- | ----- |\n| D1    | D2    |\n| D3    | D4    |"
        );
    }

    #[test]
    fn escapes_pipes() {
        let t = rows(&[&["a|b", "c"], &["d", "e"]]);
        assert!(render_table(&t, false).contains("a\\|b"));
    }

    #[test]
    fn validation() {
        assert!(validate_rows(&s2()).is_some());
        assert!(validate_rows(&rows(&[&["only", "row"]])).is_none());
        assert!(validate_rows(&rows(&[&["a"], &["b"]])).is_none());
        assert!(validate_rows(&rows(&[&["1", "2"], &["3", "4"], &["5", "6"]])).is_none());
        assert!(validate_rows(&rows(&[&["a", "b"], &["", ""], &[" ", ""]])).is_none());
        let ragged = validate_rows(&rows(&[&["h1", "h2", "h3"], &["x", "y"]])).unwrap_or_default();
        assert_eq!(ragged[1], vec!["x", "y", ""]);
    }

    fn span(text: &str, x: f32, y: f32) -> Span {
        let w = text.len() as f32 * 5.0;
        Span {
            page: 1,
            text: text.into(),
            font: "Helvetica".into(),
            size: 10.0,
            x,
            y,
            bbox: BoundingBox::new(x, y - 10.0, x + w, y),
        }
    }

    #[test]
    fn aligned_spans_become_a_table() {
        let spans = vec![
            span("intro text here", 72.0, 90.0),
            span("Name", 72.0, 110.0),
            span("Score", 250.0, 110.0),
            span("Alice", 72.0, 124.0),
            span("9", 251.0, 124.0),
            span("Bob", 73.0, 138.0),
            span("7", 250.0, 138.0),
        ];
        let refs: Vec<&Span> = spans.iter().collect();
        let found = tables_from_spans(1, &refs);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rows[0], vec!["Name", "Score"]);
        assert_eq!(found[0].rows.len(), 3);
        let bbox = found[0].bbox.unwrap();
        assert_eq!((bbox.x0, bbox.y0), (72.0, 100.0));
        assert_eq!((bbox.x1, bbox.y1), (275.0, 138.0));
    }

    #[test]
    fn extraction_declares_the_layout_it_reads() {
        assert_eq!(ExtractTables.reads(), &[Field::Pages, Field::Spans]);
        let err = crate::pipeline::Pipeline::new(
            Locale::En,
            ContentKind::Article,
            vec![Box::new(ExtractTables)],
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("pages"), "{err}");
    }

    fn place(md: &str, tables: Vec<TableCandidate>) -> (String, StageReport) {
        let config = ConversionConfig::default();
        let source = MemorySource::from_text("");
        let env = StageEnv {
            config: &config,
            source: &source,
            ocr: None,
        };
        let mut ctx = ConversionContext::new("t", Locale::En, ContentKind::Article);
        ctx.set_markdown(md.into());
        ctx.set_tables(tables);
        let report = PlaceTables.run(&mut ctx, &env).unwrap_or_default();
        (ctx.markdown().cloned().unwrap_or_default(), report)
    }

    fn table(number: usize) -> TableCandidate {
        TableCandidate {
            number,
            page: 2,
            rows: s2(),
            anchor: None,
        }
    }

    #[test]
    fn placed_after_citing_paragraph_once() {
        let md = "# Results\n\nAs Table 1 shows, it works.\n\nClosing words.";
        let (out, report) = place(md, vec![table(1)]);
        assert_eq!(
            out,
            "# Results\n\nAs Table 1 shows, it works.\n\n**Table 1** (Page 2)\n\n\
             | Col A | Col B |\n|---|---|\n| D1 | D2 |\n| D3 | D4 |\n\n\n\nClosing words."
        );
        assert_eq!(report.metrics, vec![(Metric::TablesPlaced, 1)]);
        let (again, _) = place(&out, vec![table(1)]);
        assert_eq!(again, out);
        assert_eq!(again.matches("| D3 | D4 |").count(), 1);
    }

    #[test]
    fn unreferenced_tables_go_to_the_end_in_order() {
        let (out, _) = place("Plain prose only.", vec![table(1), table(2)]);
        let first = out.find("**Table 1**").unwrap_or(usize::MAX);
        let second = out.find("**Table 2**").unwrap_or(0);
        assert!(first < second);
        assert!(out.starts_with("Plain prose only."));
    }
}
