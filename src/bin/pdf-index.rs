//! CLI binary for edgequake-pdf-index.
//!
//! A thin shim over the library crate: maps flags to `IndexConfig`, runs one
//! analysis session and writes `<stem>_indexed.pdf`.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_index::config::{credential_env_vars, default_model_for, DEFAULT_PROVIDER};
use edgequake_pdf_index::{
    inspect, resolve_input, AnalysisProgressCallback, ErrorPolicy, IndexConfig, IndexSession,
    PageSelection, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── indicatif progress callback ──────────────────────────────────────────────

/// Live progress bar with one log line per page.
struct CliProgress {
    bar: ProgressBar,
    /// Start of the request in flight (pages run one at a time).
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgress {
    fn on_analysis_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Detecting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, current: usize, total: usize, page: u32) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page} ({current}/{total})"));
    }

    fn on_page_complete(&self, page: u32, link_count: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>4}  {:<10}  {}",
            green("✓"),
            page,
            dim(&format!("{link_count:>3} links")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>4}  {}  {}",
            red("✗"),
            page,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages analysed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages analysed  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Link every index entry (writes book_indexed.pdf next to book.pdf)
  pdf-index book.pdf

  # Only the index pages, explicit output
  pdf-index --pages 301-312 book.pdf -o linked.pdf

  # Another provider
  pdf-index --provider openai --model gpt-4.1-mini book.pdf

  # Print detected entries as JSON, no PDF written
  pdf-index --detect-only --json --pages 5 book.pdf

  # Page count and header facts (no API key needed)
  pdf-index --inspect-only book.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY     Google Gemini API key (default provider)
  GOOGLE_API_KEY     Used for Gemini when GEMINI_API_KEY is unset
  OPENAI_API_KEY     OpenAI API key
  ANTHROPIC_API_KEY  Anthropic API key
  MISTRAL_API_KEY    Mistral API key
  OPENROUTER_API_KEY OpenRouter API key
  RUST_LOG           Override log filter (e.g. edgequake_pdf_index=debug)

PDFIUM:
  The pdfium shared library is looked up in --pdfium-lib, then the current
  directory, then the system library path.
"#;

/// Turn index and table-of-contents pages of a PDF into clickable links.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-index",
    version,
    about = "Turn index and table-of-contents pages of a PDF into clickable links",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output PDF path. Default: <stem>_indexed.pdf next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Vision provider: gemini, openai, anthropic, mistral, ollama, …
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Vision model ID. Default depends on the provider.
    #[arg(long)]
    model: Option<String>,

    /// Print the analysis report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Detect entries but do not write a PDF.
    #[arg(long)]
    detect_only: bool,

    /// Print document facts only; no rendering, no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Stop at the first page that fails.
    #[arg(long)]
    fail_fast: bool,

    /// Directory containing the pdfium shared library.
    #[arg(long, value_name = "DIR")]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-page feedback; library INFO logs
    // would only tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let source = resolve_input(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to open {}", cli.input))?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&source).context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
            );
        } else {
            println!("File:         {}", info.name);
            println!("Pages:        {}", info.page_count);
            println!("Size:         {} bytes", info.file_size);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Encrypted:    {}", info.encrypted);
        }
        return Ok(());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Analyse ──────────────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| edgequake_pdf_index::pipeline::input::default_output_path(&cli.input, &source));
    let mut session = IndexSession::new(source);
    let report = session.analyze(&config).await.context("Analysis failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && !show_progress {
        eprintln!(
            "Analysed {}/{} pages: {} links",
            report.stats.succeeded_pages, report.stats.selected_pages, report.stats.total_links
        );
        for failure in &report.failures {
            eprintln!("  {failure}");
        }
    }

    if cli.detect_only {
        return Ok(());
    }

    // ── Export ───────────────────────────────────────────────────────────
    let stats = session
        .export_to(&output_path)
        .await
        .with_context(|| format!("Failed to export {}", output_path.display()))?;

    if !cli.quiet {
        eprintln!(
            "{}  {} links written  {}  →  {}",
            if stats.skipped.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.written,
            dim(&format!("{} skipped", stats.skipped.len())),
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&report.stats.total_input_tokens.to_string()),
            dim(&report.stats.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `IndexConfig`. The credential is read here, once.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IndexConfig> {
    let from_env = IndexConfig::from_env_for(&cli.provider);
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| default_model_for(&cli.provider).to_string());

    let mut builder = IndexConfig::builder()
        .provider_name(cli.provider.clone())
        .model(model)
        .pages(parse_pages(&cli.pages)?)
        .error_policy(if cli.fail_fast {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::ContinueOnError
        })
        .download_timeout_secs(cli.download_timeout);

    if let Some(key) = from_env.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;
    config.ensure_credential().with_context(|| {
        format!(
            "No credential for provider '{}' (set {})",
            cli.provider,
            credential_env_vars(&cli.provider).join(" or ")
        )
    })?;
    Ok(config)
}

/// Parse `--pages` into a `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    let parse_one = |p: &str| -> Result<u32> {
        let n: u32 = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", n);
        }
        Ok(n)
    };

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (parse_one(start)?, parse_one(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages = s.split(',').map(parse_one).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    Ok(PageSelection::Single(parse_one(&s)?))
}
