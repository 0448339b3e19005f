//! Configuration types for PDF-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The two identity knobs, [`Locale`]
//! and [`ContentKind`], decide which stages the pipeline is assembled from;
//! everything else tunes individual stages.
//!
//! The core reads no environment variables. The CLI maps its flags (and
//! their `PAPERMD_*` environment fallbacks) onto the builder.

use crate::error::Pdf2MdError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for a PDF-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use papermd::{ConversionConfig, ContentKind, Locale};
///
/// let config = ConversionConfig::builder()
///     .locale(Locale::PtBr)
///     .content_kind(ContentKind::Book)
///     .max_ocr_pages(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.locale, Locale::PtBr);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Target locale. Selects section vocabulary, verb lists, connectives,
    /// and the OCR language. Default: [`Locale::En`].
    pub locale: Locale,

    /// Content kind. Selects the formatter pool. Default: [`ContentKind::Auto`],
    /// which behaves as [`ContentKind::Article`].
    pub content_kind: ContentKind,

    /// Size (bytes of assembled Markdown) above which only the cheap rewriting
    /// strategies are arbitrated. Default: 1 000 000.
    pub oversize_threshold_bytes: usize,

    /// Selective-OCR settings.
    pub ocr: OcrSettings,

    /// Directory where extracted images are written (an `images/` folder is
    /// created inside it). `None` disables image extraction.
    pub image_dir: Option<PathBuf>,

    /// How image references are written into the Markdown. Default: relative.
    pub image_links: ImageLinkStyle,

    /// Pad table cells to per-column width. Default: false (compact pipes).
    pub align_tables: bool,

    /// Run the out-of-vocabulary spelling pass. Default: true.
    pub spell_check: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Number of documents converted at once by [`crate::stream::convert_stream`].
    /// A single conversion never parallelises internally. Default: 4.
    pub concurrency: usize,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            content_kind: ContentKind::default(),
            oversize_threshold_bytes: 1_000_000,
            ocr: OcrSettings::default(),
            image_dir: None,
            image_links: ImageLinkStyle::default(),
            align_tables: false,
            spell_check: true,
            password: None,
            download_timeout_secs: 120,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("locale", &self.locale)
            .field("content_kind", &self.content_kind)
            .field("oversize_threshold_bytes", &self.oversize_threshold_bytes)
            .field("ocr", &self.ocr)
            .field("image_dir", &self.image_dir)
            .field("image_links", &self.image_links)
            .field("align_tables", &self.align_tables)
            .field("spell_check", &self.spell_check)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
            error: None,
        }
    }
}

/// Builder for [`ConversionConfig`].
///
/// String setters ([`locale_str`](Self::locale_str),
/// [`content_kind_str`](Self::content_kind_str)) defer their parse error to
/// [`build`](Self::build) so chains stay fluent.
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
    error: Option<Pdf2MdError>,
}

impl ConversionConfigBuilder {
    pub fn locale(mut self, locale: Locale) -> Self {
        self.config.locale = locale;
        self
    }

    pub fn locale_str(mut self, locale: &str) -> Self {
        match locale.parse() {
            Ok(l) => self.config.locale = l,
            Err(e) => self.error = self.error.or(Some(e)),
        }
        self
    }

    pub fn content_kind(mut self, kind: ContentKind) -> Self {
        self.config.content_kind = kind;
        self
    }

    pub fn content_kind_str(mut self, kind: &str) -> Self {
        match kind.parse() {
            Ok(k) => self.config.content_kind = k,
            Err(e) => self.error = self.error.or(Some(e)),
        }
        self
    }

    pub fn oversize_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.oversize_threshold_bytes = bytes;
        self
    }

    pub fn ocr(mut self, settings: OcrSettings) -> Self {
        self.config.ocr = settings;
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr.enabled = v;
        self
    }

    pub fn max_ocr_pages(mut self, n: usize) -> Self {
        self.config.ocr.max_pages = n;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocr.tesseract_path = Some(path.into());
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn image_links(mut self, style: ImageLinkStyle) -> Self {
        self.config.image_links = style;
        self
    }

    pub fn align_tables(mut self, v: bool) -> Self {
        self.config.align_tables = v;
        self
    }

    pub fn spell_check(mut self, v: bool) -> Self {
        self.config.spell_check = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2MdError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.ocr.enabled && (c.ocr.render_variants.is_empty() || c.ocr.engine_variants.is_empty()) {
            return Err(Pdf2MdError::InvalidConfig(
                "OCR needs at least one render variant and one engine variant".into(),
            ));
        }
        if let Some(bad) = c.ocr.render_variants.iter().find(|v| !(0.5..=8.0).contains(&v.zoom)) {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "OCR render zoom must be 0.5–8.0, got {}",
                bad.zoom
            )));
        }
        if !(0.0..=1.0).contains(&c.ocr.quality_threshold) {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "OCR quality threshold must be 0.0–1.0, got {}",
                c.ocr.quality_threshold
            )));
        }
        Ok(self.config)
    }
}

// ── Selective OCR settings ───────────────────────────────────────────────

/// Knobs for the selective-OCR stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Run OCR at all. Default: true (the stage still only touches pages
    /// whose embedded text looks unreliable).
    pub enabled: bool,

    /// Upper bound on OCR'd pages per document. Default: 10.
    pub max_pages: usize,

    /// Rendering variants tried for every flagged page.
    pub render_variants: Vec<RenderVariant>,

    /// Engine configurations tried for every rendering.
    pub engine_variants: Vec<EngineVariant>,

    /// Explicit path to the `tesseract` executable. Default: found on `PATH`.
    pub tesseract_path: Option<PathBuf>,

    /// Embedded-text quality score below which OCR is triggered. Default: 0.5.
    pub quality_threshold: f64,

    /// How much better (quality score) the best OCR attempt must be before it
    /// replaces repetitive embedded text outright. Default: 0.1.
    pub replace_margin: f64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pages: 10,
            render_variants: vec![
                RenderVariant { zoom: 2.0, colorspace: Colorspace::Gray },
                RenderVariant { zoom: 3.0, colorspace: Colorspace::Rgb },
            ],
            engine_variants: vec![
                EngineVariant { psm: 6, oem: 3 },
                EngineVariant { psm: 3, oem: 1 },
            ],
            tesseract_path: None,
            quality_threshold: 0.5,
            replace_margin: 0.1,
        }
    }
}

/// How a page is rasterised before OCR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderVariant {
    pub zoom: f32,
    pub colorspace: Colorspace,
}

/// Colour model of the rendered bitmap handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Colorspace {
    Gray,
    Rgb,
}

/// OCR engine parameters: page-segmentation mode and engine mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVariant {
    pub psm: u8,
    pub oem: u8,
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Target locale of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "pt-BR")]
    PtBr,
}

impl Locale {
    /// Canonical tag (`en`, `pt-BR`).
    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::PtBr => "pt-BR",
        }
    }

    /// Tesseract traineddata name for this locale.
    pub fn ocr_language(self) -> &'static str {
        match self {
            Locale::En => "eng",
            Locale::PtBr => "por",
        }
    }

    /// Guess the locale of a text sample from function-word frequency.
    ///
    /// This is an optional pre-stage for hosts that do not know the locale;
    /// the pipeline itself always takes an explicit locale. Ties go to `En`.
    pub fn guess(sample: &str) -> Locale {
        const EN: &[&str] = &[
            "the", "and", "of", "to", "is", "in", "that", "with", "for", "this", "are", "was",
        ];
        const PT: &[&str] = &[
            "de", "que", "não", "uma", "os", "para", "com", "como", "dos", "das", "são", "foi",
        ];
        let mut en = 0usize;
        let mut pt = 0usize;
        for word in sample
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| !w.is_empty())
            .take(5_000)
        {
            let w = word.to_lowercase();
            if EN.contains(&w.as_str()) {
                en += 1;
            }
            if PT.contains(&w.as_str()) {
                pt += 1;
            }
        }
        if pt > en {
            Locale::PtBr
        } else {
            Locale::En
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "pt-br" => Ok(Locale::PtBr),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown locale '{other}' (expected 'en' or 'pt-BR')"
            ))),
        }
    }
}

/// Kind of document, selecting the downstream formatter pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Auto,
    Article,
    Book,
}

impl ContentKind {
    /// The kind the formatter pool is actually built for (`Auto` → `Article`).
    pub fn effective(self) -> ContentKind {
        match self {
            ContentKind::Auto | ContentKind::Article => ContentKind::Article,
            ContentKind::Book => ContentKind::Book,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Auto => "auto",
            ContentKind::Article => "article",
            ContentKind::Book => "book",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ContentKind::Auto),
            "article" => Ok(ContentKind::Article),
            "book" => Ok(ContentKind::Book),
            other => Err(Pdf2MdError::InvalidConfig(format!(
                "unknown content kind '{other}' (expected 'auto', 'article' or 'book')"
            ))),
        }
    }
}

/// How image references are written into the Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageLinkStyle {
    /// `![name](./images/name)` pointing at the saved file. (default)
    #[default]
    Relative,
    /// `![name](data:image/png;base64,…)` embedding the bitmap.
    Inline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_parses_known_tags() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("pt-BR".parse::<Locale>().unwrap(), Locale::PtBr);
        assert_eq!("PT-br".parse::<Locale>().unwrap(), Locale::PtBr);
    }

    #[test]
    fn locale_rejects_unknown() {
        let err = "fr".parse::<Locale>().unwrap_err();
        assert!(matches!(err, Pdf2MdError::InvalidConfig(_)));
    }

    #[test]
    fn content_kind_auto_is_article() {
        assert_eq!(ContentKind::Auto.effective(), ContentKind::Article);
        assert_eq!(ContentKind::Book.effective(), ContentKind::Book);
        assert!("magazine".parse::<ContentKind>().is_err());
    }

    #[test]
    fn builder_defers_parse_errors_to_build() {
        let result = ConversionConfig::builder()
            .locale_str("de")
            .content_kind(ContentKind::Book)
            .build();
        assert!(matches!(result, Err(Pdf2MdError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_bad_zoom() {
        let mut ocr = OcrSettings::default();
        ocr.render_variants = vec![RenderVariant { zoom: 20.0, colorspace: Colorspace::Gray }];
        assert!(ConversionConfig::builder().ocr(ocr).build().is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let c = ConversionConfig::default();
        assert_eq!(c.oversize_threshold_bytes, 1_000_000);
        assert_eq!(c.ocr.max_pages, 10);
        assert_eq!(c.ocr.render_variants.len(), 2);
        assert_eq!(c.ocr.engine_variants.len(), 2);
        assert!(c.spell_check);
        assert_eq!(c.image_links, ImageLinkStyle::Relative);
    }

    #[test]
    fn guess_locale_from_function_words() {
        assert_eq!(
            Locale::guess("Os resultados da pesquisa mostram que a maioria dos alunos não usa"),
            Locale::PtBr
        );
        assert_eq!(
            Locale::guess("The results of the study show that most of the students are"),
            Locale::En
        );
    }

    #[test]
    fn locale_serialises_as_tag() {
        assert_eq!(serde_json::to_string(&Locale::PtBr).unwrap(), "\"pt-BR\"");
        assert_eq!(serde_json::to_string(&ContentKind::Book).unwrap(), "\"book\"");
    }
}
