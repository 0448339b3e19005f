//! Selective OCR: re-read the pages whose embedded text cannot be trusted.
//!
//! ## When does OCR run?
//!
//! A page is flagged when its text layer is sparse (few characters, or few
//! characters for its area), when it carries many images, or when a large
//! share of its codepoints are unreadable. When the document as a whole
//! scores below the quality threshold, or repeats itself badly, every page
//! whose own text fails the same test is flagged too. At most
//! `max_pages` pages are processed, worst first.
//!
//! ## Attempts and selection
//!
//! Each flagged page is rendered with every configured render variant and
//! read with every engine variant. Each successful attempt is rebuilt from
//! its token table and scored `0.6·confidence + 0.4·structure`; the highest
//! score wins. A failed attempt is only counted.
//!
//! ## Merge
//!
//! OCR replaces the page text only when the embedded text is badly
//! repetitive and the winner's quality beats it by the configured margin.
//! Otherwise OCR lines missing from the embedded text are spliced in. Either
//! way the result is deduplicated. A page with no successful attempt keeps
//! its embedded text.

pub mod merge;
pub mod quality;
pub mod reconstruct;

use super::context::{ConversionContext, Field, OcrReport, PageInfo, PageText, TextOrigin};
use super::{require, Stage, StageEnv, StageReport};
use crate::config::{Colorspace, EngineVariant, Locale, OcrSettings, RenderVariant};
use crate::error::{OcrError, StageError};
use crate::lexicon::{lexicon, Lexicon};
use crate::output::{OcrPageSummary, OcrUse};
use crate::source::{OcrEngine, OcrParams, PdfSource};
use crate::text::corrupt_ratio;
use image::DynamicImage;
use quality::{analyze, TextQuality};
use reconstruct::reconstruct;
use tracing::{debug, info, warn};

/// Pages with fewer embedded characters than this are sparse.
pub const SPARSE_CHARS: usize = 50;
/// Embedded characters per square inch below which a page is sparse.
pub const MIN_CHARS_PER_SQ_INCH: f64 = 2.0;
/// Pages with at least this many images are flagged.
pub const MANY_IMAGES: usize = 3;
/// Corrupt-codepoint ratio above which a page is flagged.
pub const CORRUPT_PAGE_RATIO: f64 = 0.1;
/// Weight of mean token confidence in an attempt's score.
pub const CONFIDENCE_WEIGHT: f64 = 0.6;
/// Weight of structural quality in an attempt's score.
pub const STRUCTURE_WEIGHT: f64 = 0.4;

/// Why a page was sent to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlag {
    Sparse,
    LowDensity,
    ManyImages,
    Corrupt,
    LowQuality,
}

/// One successful OCR attempt, reduced to what selection and merge need.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub render: RenderVariant,
    pub engine: EngineVariant,
    pub text: String,
    pub headings: Vec<String>,
    pub histogram: [usize; 10],
    pub mean_confidence: f64,
    pub structural_quality: f64,
    pub weighted: f64,
}

/// `0.6·mean_confidence + 0.4·structural_quality`.
pub fn weighted_score(mean_confidence: f64, structural_quality: f64) -> f64 {
    CONFIDENCE_WEIGHT * mean_confidence + STRUCTURE_WEIGHT * structural_quality
}

/// The attempt with the highest weighted score; the earliest wins ties.
pub fn select_best(attempts: &[Attempt]) -> Option<&Attempt> {
    attempts.iter().fold(None, |best: Option<&Attempt>, a| match best {
        Some(b) if b.weighted >= a.weighted => Some(b),
        _ => Some(a),
    })
}

/// Per-page heuristics on the embedded layer.
pub fn page_flag(info: &PageInfo, text: &str) -> Option<PageFlag> {
    let area_sq_in = f64::from(info.width) * f64::from(info.height) / (72.0 * 72.0);
    if info.char_count < SPARSE_CHARS {
        Some(PageFlag::Sparse)
    } else if area_sq_in > 0.0 && (info.char_count as f64 / area_sq_in) < MIN_CHARS_PER_SQ_INCH {
        Some(PageFlag::LowDensity)
    } else if info.image_count >= MANY_IMAGES {
        Some(PageFlag::ManyImages)
    } else if corrupt_ratio(text) > CORRUPT_PAGE_RATIO {
        Some(PageFlag::Corrupt)
    } else {
        None
    }
}

/// Pages to OCR, in page order, capped at `settings.max_pages` (lowest
/// quality first when the cap bites).
pub fn flag_pages(
    pages: &[PageInfo],
    texts: &[PageText],
    settings: &OcrSettings,
    lex: &Lexicon,
) -> Vec<(usize, PageFlag)> {
    let joined: String = texts
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let doc_quality = analyze(&joined, lex);
    let doc_triggered = doc_quality.needs_ocr(settings.quality_threshold);
    debug!(score = doc_quality.score, triggered = doc_triggered, "document text quality");

    let mut flagged: Vec<(usize, PageFlag, f64)> = Vec::new();
    for text in texts {
        let Some(info) = pages.iter().find(|p| p.number == text.page) else {
            continue;
        };
        let q = analyze(&text.text, lex);
        let flag = page_flag(info, &text.text).or_else(|| {
            (doc_triggered && q.needs_ocr(settings.quality_threshold)).then_some(PageFlag::LowQuality)
        });
        if let Some(flag) = flag {
            flagged.push((text.page, flag, q.score));
        }
    }

    if flagged.len() > settings.max_pages {
        flagged.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
        flagged.truncate(settings.max_pages);
        flagged.sort_by_key(|f| f.0);
    }
    flagged.into_iter().map(|(p, f, _)| (p, f)).collect()
}

fn to_colorspace(img: &DynamicImage, colorspace: Colorspace) -> DynamicImage {
    match colorspace {
        Colorspace::Gray => DynamicImage::ImageLuma8(img.to_luma8()),
        Colorspace::Rgb => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Every render × engine combination for one page. Returns the successful
/// attempts and the number tried.
pub fn run_attempts(
    page: usize,
    source: &dyn PdfSource,
    engine: &dyn OcrEngine,
    settings: &OcrSettings,
    locale: Locale,
) -> (Vec<Attempt>, usize) {
    let lex = lexicon(locale);
    let mut attempts = Vec::new();
    let mut tried = 0;
    for render in &settings.render_variants {
        let image = match source.render_page(page, render.zoom) {
            Ok(img) => to_colorspace(&img, render.colorspace),
            Err(e) => {
                tried += settings.engine_variants.len();
                let err = OcrError::Render {
                    page,
                    zoom: render.zoom,
                    detail: e.to_string(),
                };
                debug!(error = %err, "render failed");
                continue;
            }
        };
        for variant in &settings.engine_variants {
            tried += 1;
            let params = OcrParams::new(*variant, locale.ocr_language());
            let output = match engine.recognize(&image, &params) {
                Ok(o) => o,
                Err(e) => {
                    debug!(page, psm = variant.psm, oem = variant.oem, error = %e, "OCR attempt failed");
                    continue;
                }
            };
            let rebuilt = reconstruct(&output.tokens, image.width(), image.height(), lex);
            let (text, headings) = if rebuilt.text.trim().is_empty() {
                (output.text.trim().to_string(), Vec::new())
            } else {
                (rebuilt.text, rebuilt.headings)
            };
            let mean_confidence = output.mean_confidence();
            let structural_quality = analyze(&text, lex).score;
            let weighted = weighted_score(mean_confidence, structural_quality);
            debug!(
                page,
                zoom = render.zoom,
                psm = variant.psm,
                oem = variant.oem,
                mean_confidence,
                structural_quality,
                weighted,
                "OCR attempt scored"
            );
            attempts.push(Attempt {
                render: *render,
                engine: *variant,
                text,
                headings,
                histogram: output.confidence_histogram(),
                mean_confidence,
                structural_quality,
                weighted,
            });
        }
    }
    (attempts, tried)
}

/// Combine the winning attempt with the embedded text.
pub fn merge_page(
    embedded: &PageText,
    best: &Attempt,
    embedded_quality: &TextQuality,
    replace_margin: f64,
) -> (PageText, OcrUse) {
    let replace = embedded.text.trim().is_empty()
        || (embedded_quality.severe_repetition()
            && best.structural_quality > embedded_quality.score + replace_margin);
    let (text, origin, used) = if replace {
        (merge::dedup(&best.text), TextOrigin::Ocr, OcrUse::Replaced)
    } else {
        (
            merge::dedup(&merge::anchored_union(&embedded.text, &best.text)),
            TextOrigin::Merged,
            OcrUse::Merged,
        )
    };
    (
        PageText {
            page: embedded.page,
            text,
            origin,
            heading_hints: best.headings.clone(),
        },
        used,
    )
}

/// The selective-OCR stage.
pub struct SelectiveOcr {
    locale: Locale,
}

impl SelectiveOcr {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }
}

impl Stage for SelectiveOcr {
    fn name(&self) -> &'static str {
        "selective-ocr"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::PageTexts, Field::Pages]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::PageTexts, Field::OcrReport]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let settings = &env.config.ocr;
        if !settings.enabled {
            return Ok(StageReport::skipped("OCR disabled"));
        }
        let Some(engine) = env.ocr else {
            return Ok(StageReport::skipped("no OCR engine available"));
        };
        let lex = lexicon(self.locale);
        let pages = require(ctx.pages(), self.name(), Field::Pages)?;
        let texts = require(ctx.page_texts(), self.name(), Field::PageTexts)?;

        let flagged = flag_pages(pages, texts, settings, lex);
        if flagged.is_empty() {
            return Ok(StageReport::skipped("no page needs OCR"));
        }
        info!(pages = ?flagged, engine = engine.name(), "running selective OCR");

        let mut updated = texts.clone();
        let mut report = OcrReport {
            flagged_pages: flagged.iter().map(|(p, _)| *p).collect(),
            pages: Vec::new(),
        };
        for (page, flag) in &flagged {
            let (attempts, tried) = run_attempts(*page, env.source, engine, settings, self.locale);
            let Some(slot) = updated.iter_mut().find(|t| t.page == *page) else {
                continue;
            };
            let Some(best) = select_best(&attempts) else {
                warn!(page, attempts = tried, "every OCR attempt failed; keeping embedded text");
                report.pages.push(OcrPageSummary {
                    page: *page,
                    attempts: tried,
                    succeeded: 0,
                    render: None,
                    engine: None,
                    weighted_score: 0.0,
                    mean_confidence: 0.0,
                    structural_quality: 0.0,
                    used: OcrUse::Unchanged,
                });
                continue;
            };
            let embedded_quality = analyze(&slot.text, lex);
            let (merged, used) = merge_page(slot, best, &embedded_quality, settings.replace_margin);
            debug!(page, ?flag, ?used, weighted = best.weighted, "OCR page merged");
            *slot = merged;
            report.pages.push(OcrPageSummary {
                page: *page,
                attempts: tried,
                succeeded: attempts.len(),
                render: Some(best.render),
                engine: Some(best.engine),
                weighted_score: best.weighted,
                mean_confidence: best.mean_confidence,
                structural_quality: best.structural_quality,
                used,
            });
        }

        let applied = report
            .pages
            .iter()
            .filter(|p| p.used != OcrUse::Unchanged)
            .count();
        let note = format!("{applied} of {} flagged pages repaired", flagged.len());
        ctx.set_page_texts(updated);
        ctx.set_ocr_report(report);
        Ok(StageReport::done().with_note(note))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentKind, ConversionConfig};
    use crate::pipeline::extract::ExtractText;
    use crate::source::{MemorySource, OcrOutput, OcrToken};

    /// Returns the same tokens for every call, with confidence set by psm.
    struct Scripted {
        lines: Vec<&'static str>,
    }

    impl OcrEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&self, _image: &DynamicImage, params: &OcrParams) -> Result<OcrOutput, OcrError> {
            if params.psm == 3 {
                return Err(OcrError::Malformed("scripted failure".into()));
            }
            let tokens = self
                .lines
                .iter()
                .enumerate()
                .map(|(i, l)| OcrToken {
                    text: (*l).into(),
                    left: 100,
                    top: 200 + 30 * i as i32,
                    width: 400,
                    height: 20,
                    confidence: 90.0,
                })
                .collect();
            Ok(OcrOutput {
                text: self.lines.join("\n"),
                tokens,
            })
        }
    }

    fn attempt(weighted: f64) -> Attempt {
        Attempt {
            render: RenderVariant {
                zoom: 2.0,
                colorspace: Colorspace::Gray,
            },
            engine: EngineVariant { psm: 6, oem: 3 },
            text: String::new(),
            headings: Vec::new(),
            histogram: [0; 10],
            mean_confidence: 0.0,
            structural_quality: 0.0,
            weighted,
        }
    }

    #[test]
    fn selection_is_argmax_with_first_tie() {
        let attempts = vec![attempt(0.4), attempt(0.9), attempt(0.9), attempt(0.1)];
        let best = select_best(&attempts).map(|a| a.weighted);
        assert_eq!(best, Some(0.9));
        assert!(std::ptr::eq(
            select_best(&attempts).unwrap_or(&attempts[0]),
            &attempts[1]
        ));
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn weighting_favours_confidence() {
        assert!((weighted_score(1.0, 0.0) - 0.6).abs() < 1e-12);
        assert!((weighted_score(0.5, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn page_flags() {
        let info = |chars, images| PageInfo {
            number: 1,
            width: 612.0,
            height: 792.0,
            image_count: images,
            char_count: chars,
        };
        assert_eq!(page_flag(&info(10, 0), "short"), Some(PageFlag::Sparse));
        assert_eq!(page_flag(&info(100, 0), "x"), Some(PageFlag::LowDensity));
        assert_eq!(page_flag(&info(2000, 4), "x"), Some(PageFlag::ManyImages));
        assert_eq!(
            page_flag(&info(2000, 0), "\u{E000}\u{E001}abcdef"),
            Some(PageFlag::Corrupt)
        );
        assert_eq!(page_flag(&info(2000, 0), "fine text"), None);
    }

    fn run_stage(source: &MemorySource, engine: &dyn OcrEngine) -> ConversionContext {
        let config = ConversionConfig::default();
        let env = StageEnv {
            config: &config,
            source,
            ocr: Some(engine),
        };
        let mut ctx = ConversionContext::new("t", Locale::En, ContentKind::Article);
        let _ = ExtractText.run(&mut ctx, &env);
        let _ = SelectiveOcr::new(Locale::En).run(&mut ctx, &env);
        ctx
    }

    #[test]
    fn sparse_page_gains_missing_lines() {
        let source = MemorySource::from_text("Existing heading line")
            .with_render(1, DynamicImage::new_luma8(1000, 1400));
        let engine = Scripted {
            lines: vec!["Existing heading line", "Recovered body text from the scan."],
        };
        let ctx = run_stage(&source, &engine);
        let texts = ctx.page_texts().cloned().unwrap_or_default();
        assert_eq!(texts[0].origin, TextOrigin::Merged);
        assert_eq!(
            texts[0].text,
            "Existing heading line\nRecovered body text from the scan."
        );
        let report = ctx.ocr_report().cloned().unwrap_or_default();
        assert_eq!(report.flagged_pages, vec![1]);
        assert_eq!(report.pages[0].attempts, 4);
        assert_eq!(report.pages[0].succeeded, 2);
        assert_eq!(report.pages[0].used, OcrUse::Merged);
    }

    #[test]
    fn failed_rendering_keeps_embedded_text() {
        let source = MemorySource::from_text("tiny");
        let engine = Scripted { lines: vec!["never"] };
        let ctx = run_stage(&source, &engine);
        let texts = ctx.page_texts().cloned().unwrap_or_default();
        assert_eq!(texts[0].text, "tiny");
        assert_eq!(texts[0].origin, TextOrigin::Embedded);
        let report = ctx.ocr_report().cloned().unwrap_or_default();
        assert_eq!(report.pages[0].used, OcrUse::Unchanged);
        assert_eq!(report.pages[0].succeeded, 0);
    }

    #[test]
    fn skipped_without_engine_or_flags() {
        let config = ConversionConfig::default();
        let source = MemorySource::from_text("x");
        let env = StageEnv {
            config: &config,
            source: &source,
            ocr: None,
        };
        let mut ctx = ConversionContext::new("t", Locale::En, ContentKind::Article);
        let _ = ExtractText.run(&mut ctx, &env);
        let report = SelectiveOcr::new(Locale::En)
            .run(&mut ctx, &env)
            .unwrap_or_default();
        assert!(report.skipped);
        assert!(ctx.ocr_report().is_none());
    }
}
