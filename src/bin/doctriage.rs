//! CLI binary for edgequake-doctriage.
//!
//! Runs the whole pipeline in-process over a `MemoryStore` and a
//! `LocalJobQueue`, then prints what it found per page.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_doctriage::{
    run_worker, Collaborators, DocumentId, DocumentStats, DocumentStore, Job, JobQueue,
    LocalJobQueue, MemoryStore, ProgressCallback, Stage, Triage, TriageConfig,
    TriageProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar reused across stages; each `on_stage_start` resets it.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TriageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, _document: DocumentId, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("{stage:<8}"));
        self.bar.reset_elapsed();
    }

    fn on_page_complete(&self, _stage: Stage, _page_num: u32) {
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, stage: Stage, page_num: u32) {
        self.bar
            .println(format!("  {} {stage} page {page_num:>3}  no text", dim("–")));
        self.bar.inc(1);
    }

    fn on_page_error(&self, stage: Stage, page_num: u32, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {stage} page {page_num:>3}  {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, _document: DocumentId, processed: usize) {
        self.bar.println(format!(
            "{} {stage}: {} pages",
            green("✓"),
            bold(&processed.to_string())
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full triage, text report
  doctriage bundle.pdf

  # Only tell scans from native pages, no OCR and no LLM analysis
  doctriage --skip-ocr --no-classify --no-extract bundle.pdf

  # JSON report with statistics
  doctriage --json --stats bundle.pdf > report.json

  # Self-hosted completion endpoint instead of a provider
  LLM_CLASSIFY_URL=http://llm:8000/v1/completions LLM_TOKEN=... doctriage bundle.pdf

ENVIRONMENT VARIABLES:
  MISTRAL_OCR_URL         OCR endpoint (default https://api.mistral.com/v1/ocr)
  MISTRAL_API_KEY         Bearer token for the OCR endpoint
  LLM_CLASSIFY_URL        Completion endpoint ({"prompt","max_tokens"} → choices[0].text)
  LLM_TOKEN               Bearer token for LLM_CLASSIFY_URL
  OPENAI_API_KEY          OpenAI API key (used when no endpoint is set)
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Tell scanned pages from native text, OCR them and classify every page.
#[derive(Parser, Debug)]
#[command(
    name = "doctriage",
    version,
    about = "Triage PDF pages: scan detection, OCR, classification and material extraction",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to triage.
    input: PathBuf,

    /// OCR endpoint receiving page PNGs as multipart uploads.
    #[arg(long, env = "MISTRAL_OCR_URL")]
    ocr_url: Option<String>,

    /// Bearer token for the OCR endpoint.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// Completion-style LLM endpoint; overrides --provider/--model.
    #[arg(long, env = "LLM_CLASSIFY_URL")]
    llm_url: Option<String>,

    /// Bearer token for --llm-url.
    #[arg(long, env = "LLM_TOKEN", hide_env_values = true)]
    llm_token: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rasterisation DPI for OCR (72–600).
    #[arg(long, env = "DOCTRIAGE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Jobs run at once.
    #[arg(short, long, env = "DOCTRIAGE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Image share of the page above which a text-poor page is a scan.
    #[arg(long, env = "DOCTRIAGE_IMAGE_COVERAGE", default_value_t = 0.70)]
    image_coverage: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCTRIAGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Don't send scanned pages to OCR.
    #[arg(long)]
    skip_ocr: bool,

    /// Don't classify pages.
    #[arg(long)]
    no_classify: bool,

    /// Don't extract materials.
    #[arg(long)]
    no_extract: bool,

    /// Append document statistics to the report.
    #[arg(long)]
    stats: bool,

    /// Print the report as JSON.
    #[arg(long, env = "DOCTRIAGE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCTRIAGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCTRIAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCTRIAGE_QUIET")]
    quiet: bool,
}

#[derive(Debug, Serialize)]
struct MaterialReport {
    name: String,
    characteristics: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PageReport {
    number: u32,
    is_scanned: bool,
    classification: Option<String>,
    raw_chars: usize,
    ocr_chars: usize,
    materials: Vec<MaterialReport>,
}

#[derive(Debug, Serialize)]
struct Report {
    file: PathBuf,
    pages: Vec<PageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<DocumentStats>,
    failures: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;

    // ── Wire the service ─────────────────────────────────────────────────
    let store = Arc::new(MemoryStore::new());
    let (queue, jobs) = LocalJobQueue::new();
    let collaborators =
        Collaborators::from_config(&config).context("Failed to set up pipeline")?;
    let triage = Arc::new(Triage::new(
        store.clone(),
        queue.clone(),
        collaborators,
        config,
    ));

    let worker = {
        let triage = Arc::clone(&triage);
        let concurrency = triage.config().job_concurrency;
        tokio::spawn(run_worker(
            queue.clone(),
            jobs,
            concurrency,
            move |job| {
                let triage = Arc::clone(&triage);
                async move { triage.run_job(job).await }
            },
        ))
    };

    // ── Run the stages ───────────────────────────────────────────────────
    let file_name = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.input.display().to_string());
    let (document, _) = triage
        .register_document(cli.input.clone(), file_name)
        .await
        .context("Failed to register document")?;
    queue.wait_idle().await;

    if let Some(failure) = queue.failures().first() {
        if let Some(ref p) = progress {
            p.finish();
        }
        worker.abort();
        bail!("Ingestion failed: {}", failure.error);
    }

    let mut stages = Vec::new();
    if !cli.skip_ocr {
        stages.push(Job::DispatchOcr(document.id));
    }
    if !cli.no_classify {
        stages.push(Job::Classify(document.id));
    }
    if !cli.no_extract {
        stages.push(Job::ExtractMaterials(document.id));
    }
    for job in stages {
        queue.submit(job);
        queue.wait_idle().await;
    }

    if let Some(ref p) = progress {
        p.finish();
    }
    worker.abort();

    // ── Report ───────────────────────────────────────────────────────────
    let report = build_report(&cli, store.as_ref(), document.id, &queue).await?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_report(&report);
    }

    if !report.failures.is_empty() && !cli.quiet {
        eprintln!(
            "{} {} job(s) failed",
            cyan("⚠"),
            red(&report.failures.len().to_string())
        );
    }
    Ok(())
}

async fn build_report(
    cli: &Cli,
    store: &dyn DocumentStore,
    document: DocumentId,
    queue: &LocalJobQueue,
) -> Result<Report> {
    let pages = store.pages(document).await?;
    let mut reports = Vec::with_capacity(pages.len());
    for page in &pages {
        let materials = store
            .materials(page.id)
            .await?
            .into_iter()
            .map(|m| MaterialReport {
                name: m.name,
                characteristics: m.characteristics,
            })
            .collect();
        reports.push(PageReport {
            number: page.number,
            is_scanned: page.is_scanned,
            classification: page.classification.clone(),
            raw_chars: page.raw_text.chars().count(),
            ocr_chars: page.ocr_text.chars().count(),
            materials,
        });
    }

    Ok(Report {
        file: cli.input.clone(),
        stats: cli.stats.then(|| DocumentStats::from_pages(&pages)),
        pages: reports,
        failures: queue
            .failures()
            .into_iter()
            .map(|f| format!("{}: {}", f.job, f.error))
            .collect(),
    })
}

fn print_report(report: &Report) {
    println!("{}", bold(&report.file.display().to_string()));
    for page in &report.pages {
        let kind = if page.is_scanned {
            cyan("scan")
        } else {
            green("text")
        };
        println!(
            "  Page {:>3}  {}  {:<26} {}",
            page.number,
            kind,
            page.classification.as_deref().unwrap_or("-"),
            dim(&format!(
                "{} chars",
                if page.is_scanned {
                    page.ocr_chars
                } else {
                    page.raw_chars
                }
            )),
        );
        for m in &page.materials {
            let traits: Vec<String> = m
                .characteristics
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            println!("      • {}  {}", m.name, dim(&traits.join(", ")));
        }
    }

    if let Some(ref s) = report.stats {
        println!();
        println!("Pages:        {}", s.total_pages);
        println!(
            "Text pages:   {} ({:.2}%)",
            s.text_pages, s.text_percentage
        );
        println!(
            "Scanned:      {} ({:.2}%)",
            s.scanned_pages, s.scanned_percentage
        );
        for (label, count) in &s.classification_counts {
            println!("  {label:<26} {count}");
        }
    }

    for failure in &report.failures {
        eprintln!("{} {}", red("✗"), failure);
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TriageConfig> {
    let mut builder = TriageConfig::builder()
        .dpi(cli.dpi)
        .job_concurrency(cli.concurrency)
        .image_coverage_threshold(cli.image_coverage);

    if let Some(ref url) = cli.ocr_url {
        builder = builder.ocr_url(url.clone());
    }
    if let Some(ref key) = cli.ocr_api_key {
        builder = builder.ocr_api_key(key.clone());
    }
    if let Some(ref url) = cli.llm_url {
        builder = builder.completion_url(url.clone());
    }
    if let Some(ref token) = cli.llm_token {
        builder = builder.completion_token(token.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
