//! [`OcrEngine`] over the `tesseract` command-line program.
//!
//! ## Why TSV?
//!
//! Plain `stdout` output only gives text. TSV mode gives one row per word with
//! its bounding box and confidence, which is what line reconstruction and
//! attempt scoring need. The full text is rebuilt from the same rows so both
//! views always agree.
//!
//! The rendered bitmap is written to a [`tempfile::NamedTempFile`] that lives
//! exactly as long as one attempt; it is removed on drop whether tesseract
//! succeeds, fails, or cannot be started.

use super::ocr::{OcrEngine, OcrOutput, OcrParams, OcrToken};
use crate::error::OcrError;
use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Drives the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    program: PathBuf,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractEngine {
    /// Use an explicit executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// True when `tesseract --version` runs successfully.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<OcrOutput, OcrError> {
        let tmp = tempfile::Builder::new()
            .prefix("papermd-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(tmp.path(), ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .arg(tmp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&params.language)
            .arg("--psm")
            .arg(params.psm.to_string())
            .arg("--oem")
            .arg(params.oem.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| OcrError::Unavailable(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_tsv(&tsv)?;
        debug!(
            psm = params.psm,
            oem = params.oem,
            tokens = parsed.tokens.len(),
            "tesseract attempt finished"
        );
        Ok(parsed)
    }
}

// ── TSV parsing ──────────────────────────────────────────────────────────

const TSV_COLUMNS: usize = 12;
const WORD_LEVEL: u32 = 5;

/// Parse tesseract TSV output into tokens plus reconstructed text.
///
/// Words sharing `(block, paragraph, line)` form one text line; a change of
/// block or paragraph inserts a blank line.
pub fn parse_tsv(tsv: &str) -> Result<OcrOutput, OcrError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(OcrError::Malformed(format!(
                "unexpected TSV header: {:.60}",
                other
            )))
        }
        None => return Ok(OcrOutput::default()),
    }

    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut last_key: Option<(u32, u32, u32)> = None;

    for row in lines {
        let cols: Vec<&str> = row.splitn(TSV_COLUMNS, '\t').collect();
        if cols.len() < TSV_COLUMNS {
            continue;
        }
        let num = |i: usize| -> Result<i64, OcrError> {
            cols[i]
                .trim()
                .parse::<f64>()
                .map(|v| v as i64)
                .map_err(|_| OcrError::Malformed(format!("bad number '{}' in column {i}", cols[i])))
        };
        if num(0)? as u32 != WORD_LEVEL {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let key = (num(2)? as u32, num(3)? as u32, num(4)? as u32);

        match last_key {
            Some(prev) if prev == key => text.push(' '),
            Some(prev) if (prev.0, prev.1) != (key.0, key.1) => text.push_str("\n\n"),
            Some(_) => text.push('\n'),
            None => {}
        }
        text.push_str(word);
        last_key = Some(key);

        tokens.push(OcrToken {
            text: word.to_string(),
            left: num(6)? as i32,
            top: num(7)? as i32,
            width: num(8)? as i32,
            height: num(9)? as i32,
            confidence: conf,
        });
    }

    Ok(OcrOutput { text, tokens })
}
