//! CLI binary for papermd.
//!
//! A thin shim over the library crate that maps flags (and `PAPERMD_*`
//! environment variables) to `ConversionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use papermd::pipeline::input;
use papermd::{
    convert, convert_stream, convert_to_file, inspect, ContentKind, ConversionConfig,
    ConversionOutput, ConversionProgressCallback, Diagnostics, ImageLinkStyle, Locale, PdfSource,
    PdfiumSource, ProgressCallback, RunState,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Pages read to guess the locale with `--locale auto`.
const LOCALE_SAMPLE_PAGES: usize = 3;

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER)
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Stage-by-stage progress bar for a single document.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style("{spinner:.cyan} {prefix:.bold}  {msg}"));
        bar.set_prefix("Preparing");
        bar.set_message("opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_stages: usize) {
        self.bar.set_length(total_stages as u64);
        self.bar.set_style(bar_style(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>2}/{len} stages  {msg}",
        ));
        self.bar.set_prefix("Converting");
    }

    fn on_stage_start(&self, name: &str, _order: usize, _total: usize) {
        self.bar.set_message(name.to_string());
    }

    fn on_stage_complete(&self, _name: &str, _order: usize, _total: usize) {
        self.bar.inc(1);
    }

    fn on_stage_error(&self, name: &str, _order: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = error.chars().take(80).collect();
        self.bar
            .println(format!("  {} {:<16} {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, stages_run: usize, stages_succeeded: usize) {
        self.bar.finish_and_clear();
        if self.errors.load(Ordering::SeqCst) == 0 {
            eprintln!("{} {} stages completed", green("✔"), bold(&stages_run.to_string()));
        } else {
            eprintln!(
                "{} {}/{} stages completed",
                yellow("⚠"),
                bold(&stages_succeeded.to_string()),
                stages_run
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert to stdout
  papermd paper.pdf

  # Brazilian Portuguese thesis, images extracted next to the output
  papermd --locale pt-BR --kind book --images tese.pdf -o tese/tese.md

  # Guess the locale from the first pages
  papermd --locale auto paper.pdf -o paper.md

  # Convert from URL
  papermd https://arxiv.org/pdf/1706.03762 -o attention.md

  # Batch: every document to <dir>/<name>.md, four at a time
  papermd --concurrency 4 a.pdf b.pdf c.pdf -o out/

  # Metadata and scanned-document check only
  papermd --inspect paper.pdf

  # Markdown plus diagnostics as JSON
  papermd --json paper.pdf > paper.json

ENVIRONMENT VARIABLES:
  PAPERMD_*         Every flag has one, e.g. PAPERMD_LOCALE=pt-BR
  PDFIUM_LIB_PATH   Path to libpdfium when it is not next to the binary
  RUST_LOG          Override the log filter (e.g. papermd=debug)

SETUP:
  pdfium must be available: place libpdfium in the working directory, install
  it system-wide, or point PDFIUM_LIB_PATH at it. OCR fallback needs the
  `tesseract` executable (with the `eng`/`por` language data) on PATH; without
  it, conversion proceeds on embedded text only.
"#;

/// Convert textual PDF papers and books to structured Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "papermd",
    version,
    about = "Convert textual PDF papers and books to structured Markdown",
    long_about = "Convert PDF papers, theses and books (local files or URLs) to structured \
Markdown. Headings are recovered from font geometry and locale vocabulary, pages with unreliable \
text are OCR'd with tesseract, and lists, quotes, code, footnotes, citations and tables are \
rebuilt. Image-only (scanned) PDFs are reported, not converted.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (one input) or directory (several inputs).
    #[arg(short, long, env = "PAPERMD_OUTPUT")]
    output: Option<PathBuf>,

    /// Document locale: en, pt-BR, or auto.
    #[arg(long, env = "PAPERMD_LOCALE", default_value = "en")]
    locale: String,

    /// Content kind: auto, article, or book.
    #[arg(long, env = "PAPERMD_KIND", default_value = "auto")]
    kind: String,

    /// Never run OCR, even on pages with unreliable text.
    #[arg(long, env = "PAPERMD_NO_OCR")]
    no_ocr: bool,

    /// Maximum number of pages sent to OCR.
    #[arg(long, env = "PAPERMD_OCR_MAX_PAGES", default_value_t = 10)]
    ocr_max_pages: usize,

    /// Path to the tesseract executable.
    #[arg(long, env = "PAPERMD_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// Extract images into an `images/` folder next to the output.
    #[arg(long, env = "PAPERMD_IMAGES")]
    images: bool,

    /// Embed extracted images as base64 data URIs (implies --images).
    #[arg(long, env = "PAPERMD_INLINE_IMAGES")]
    inline_images: bool,

    /// Pad table cells so columns line up.
    #[arg(long, env = "PAPERMD_ALIGN_TABLES")]
    align_tables: bool,

    /// Skip spelling correction (text normalisation still runs).
    #[arg(long, env = "PAPERMD_NO_SPELL_CHECK")]
    no_spell_check: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAPERMD_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPERMD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Documents converted at once in batch mode.
    #[arg(short, long, env = "PAPERMD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print Markdown and diagnostics as JSON instead of Markdown.
    #[arg(long, env = "PAPERMD_JSON")]
    json: bool,

    /// Print document metadata and the scanned-PDF assessment only.
    #[arg(long)]
    inspect: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PAPERMD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPERMD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPERMD_QUIET")]
    quiet: bool,
}

impl Cli {
    fn batch(&self) -> bool {
        self.inputs.len() > 1
    }

    fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress && !self.json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; keep the library
    // quiet underneath it unless asked.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.show_progress() {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.inspect {
        return run_inspect(&cli).await;
    }
    if cli.batch() {
        run_batch(&cli).await
    } else {
        run_single(&cli).await
    }
}

// ── Modes ────────────────────────────────────────────────────────────────

async fn run_inspect(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None, None, None).await?;
    for input in &cli.inputs {
        let meta = inspect(input, &config)
            .await
            .with_context(|| format!("Failed to inspect {input}"))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
            );
            continue;
        }
        println!("File:         {input}");
        if let Some(ref t) = meta.title {
            println!("Title:        {t}");
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {a}");
        }
        println!("Pages:        {}", meta.page_count);
        println!("Text pages:   {}", meta.text_pages);
        println!("Image pages:  {}", meta.image_pages);
        println!("PDF Version:  {}", meta.pdf_version);
        if let Some(ref p) = meta.producer {
            println!("Producer:     {p}");
        }
        println!(
            "Scanned:      {}",
            if meta.scanned_pdf { yellow("yes (will not be converted)") } else { "no".into() }
        );
    }
    Ok(())
}

async fn run_single(cli: &Cli) -> Result<()> {
    let input = &cli.inputs[0];
    let progress: Option<ProgressCallback> = cli
        .show_progress()
        .then(|| CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>);
    let image_dir = cli.wants_images().then(|| match &cli.output {
        Some(path) => parent_dir(path),
        None => PathBuf::from("."),
    });
    let locale = resolve_locale(cli, input).await?;
    let config = build_config(cli, Some(locale), image_dir, progress).await?;

    if let (Some(path), false) = (&cli.output, cli.json) {
        let diagnostics = convert_to_file(input, path, &config)
            .await
            .context("Conversion failed")?;
        if !cli.quiet {
            print_summary(&diagnostics, Some(path));
        }
        return Ok(());
    }

    let output = convert(input, &config).await.context("Conversion failed")?;
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        match &cli.output {
            Some(path) => tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => println!("{json}"),
        }
    } else {
        write_stdout(&output)?;
    }
    if !cli.quiet {
        print_summary(&output.diagnostics, None);
    }
    Ok(())
}

async fn run_batch(cli: &Cli) -> Result<()> {
    let Some(out_dir) = cli.output.clone() else {
        bail!("Several inputs need an output directory: pass -o <dir>");
    };
    if cli.wants_images() {
        bail!("--images writes one images/ folder per output directory; convert documents one at a time");
    }
    tokio::fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    // One locale for the whole batch; `auto` samples the first document.
    let locale = resolve_locale(cli, &cli.inputs[0]).await?;
    let config = build_config(cli, Some(locale), None, None).await?;

    let bar = if cli.show_progress() {
        let bar = ProgressBar::new(cli.inputs.len() as u64);
        bar.set_style(bar_style(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}",
        ));
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut failed = 0usize;
    let mut results = convert_stream(cli.inputs.clone(), &config);
    while let Some((input, result)) = results.next().await {
        bar.inc(1);
        let target = out_dir.join(output_name(&input));
        let outcome = match result {
            Ok(output) => write_output(&target, &output, cli.json).await,
            Err(e) => Err(anyhow::Error::new(e)),
        };
        match outcome {
            Ok(()) if !cli.quiet => {
                bar.println(format!("  {} {}  →  {}", green("✓"), input, target.display()))
            }
            Ok(()) => {}
            Err(e) => {
                failed += 1;
                bar.println(format!("  {} {}  {}", red("✗"), input, red(&format!("{e:#}"))));
            }
        }
    }
    bar.finish_and_clear();

    if failed > 0 {
        bail!("{failed} of {} documents failed", cli.inputs.len());
    }
    if !cli.quiet {
        eprintln!(
            "{} {} documents converted  →  {}",
            green("✔"),
            bold(&cli.inputs.len().to_string()),
            out_dir.display()
        );
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────

impl Cli {
    fn wants_images(&self) -> bool {
        self.images || self.inline_images
    }
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    cli: &Cli,
    locale: Option<Locale>,
    image_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let kind: ContentKind = cli.kind.parse().context("Invalid --kind")?;
    let mut builder = ConversionConfig::builder()
        .locale(locale.unwrap_or_default())
        .content_kind(kind)
        .ocr_enabled(!cli.no_ocr)
        .max_ocr_pages(cli.ocr_max_pages)
        .align_tables(cli.align_tables)
        .spell_check(!cli.no_spell_check)
        .download_timeout_secs(cli.download_timeout)
        .concurrency(cli.concurrency);
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_path(path);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(dir) = image_dir {
        builder = builder.image_dir(dir);
        if cli.inline_images {
            builder = builder.image_links(ImageLinkStyle::Inline);
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// `--locale`, with `auto` resolved by sampling the document's first pages.
async fn resolve_locale(cli: &Cli, input: &str) -> Result<Locale> {
    if !cli.locale.eq_ignore_ascii_case("auto") {
        return cli.locale.parse().context("Invalid --locale");
    }
    match sample_text(input, cli).await {
        Ok(sample) => {
            let locale = Locale::guess(&sample);
            if !cli.quiet {
                eprintln!("{} locale guessed: {}", dim("·"), bold(locale.tag()));
            }
            Ok(locale)
        }
        Err(e) => {
            warn!(error = %e, "could not sample text for locale guess; using en");
            Ok(Locale::En)
        }
    }
}

async fn sample_text(input: &str, cli: &Cli) -> Result<String> {
    let resolved = input::resolve_input(input, cli.download_timeout).await?;
    let password = cli.password.clone();
    let text = tokio::task::spawn_blocking(move || -> Result<String> {
        let source = PdfiumSource::new(resolved.path(), password);
        let pages = source.page_count()?.min(LOCALE_SAMPLE_PAGES);
        let mut sample = String::new();
        for page in 1..=pages {
            sample.push_str(&source.plain_text(page)?);
            sample.push('\n');
        }
        Ok(sample)
    })
    .await
    .context("Locale sampling task failed")??;
    Ok(text)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `dir/Paper One.pdf` or `https://host/paper.pdf?x` → `Paper One.md`.
fn output_name(input: &str) -> String {
    let last = input
        .split(['?', '#'])
        .next()
        .unwrap_or(input)
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input);
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.md")
}

async fn write_output(path: &Path, output: &ConversionOutput, json: bool) -> Result<()> {
    let (path, body) = if json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        (path.with_extension("json"), json)
    } else {
        (path.to_path_buf(), output.markdown.clone())
    };
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_stdout(output: &ConversionOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(output.markdown.as_bytes())
        .context("Failed to write to stdout")?;
    if !output.markdown.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_summary(d: &Diagnostics, written: Option<&Path>) {
    if d.state == RunState::ScannedShortCircuit {
        eprintln!(
            "{} {} looks like a scanned PDF; an advisory was written instead of a conversion",
            yellow("⚠"),
            d.source
        );
        return;
    }
    let failed = d.failed_stages().count();
    let mark = if failed == 0 { green("✔") } else { yellow("⚠") };
    let target = written
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!("{mark}  {}  {}ms{target}", d.source, d.total_duration_ms);
    eprintln!(
        "   {}",
        dim(&format!(
            "OCR pages {}  tables {}  images {}  spelling fixes {}{}",
            d.ocr_pages_processed,
            d.tables_placed,
            d.images_extracted,
            d.spelling_corrections,
            d.chosen_strategy
                .as_deref()
                .map(|s| format!("  strategy {s}"))
                .unwrap_or_default(),
        ))
    );
    for stage in d.failed_stages() {
        eprintln!(
            "   {} {}: {}",
            red("✗"),
            stage.name,
            stage.error.as_deref().unwrap_or("failed")
        );
    }
}
