//! CLI binary for edgequake-docai.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the pipeline, and writes the markdown reports.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docai::{
    clean_scratch, create_archive, process_document, write_markdown_reports, DocumentInput,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, SourceKind, Stage, StageProgress,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar step per stage, one log line per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    stage_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            stage_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.stage_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_stages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} stages  {msg}  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_stages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Running {total_stages} stages…"))
        ));
    }

    fn on_stage_start(&self, stage: Stage, _index: usize, _total: usize) {
        if let Ok(mut t) = self.stage_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(stage.message());
    }

    fn on_stage_complete(&self, progress: StageProgress) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            progress.stage.name(),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.set_position(progress.completed as u64);
    }

    fn on_run_complete(&self, total_stages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} stages completed",
            green("✔"),
            bold(&total_stages.to_string())
        );
    }

    fn on_run_failed(&self, stage: Stage, error: &str) {
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<24} {}",
            red("✗"),
            stage.name(),
            red(&msg)
        ));
        self.bar.abandon();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a PDF in English
  docai report.pdf

  # Translate to Korean, then summarise; zip the results
  docai --translate --lang Korean --zip report.pdf

  # A scanned document as ordered page images
  docai --filetype image scan_01.jpg scan_02.jpg scan_03.jpg

  # Smaller chunks for the analysis service, different model
  docai --batch-size 5 --provider openai --model gpt-4.1-mini paper.pdf

  # Machine-readable run summary
  docai --json report.pdf > run.json

OUTPUT:
  Everything is written to a folder next to the input, named after its stem:
    report/report_text_summary.md    per-page summaries
    report/report_image_summary.md   figure crops + summaries
    report/report_table_summary.md   table crops + summaries
    report/report_translate.md       per-page translation (--translate)
    report/report_markdown.zip       the whole folder (--zip)

ENVIRONMENT VARIABLES:
  UPSTAGE_API_KEY         Document-analysis service key (required)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Analyse, crop, translate and summarise PDFs and page images.
#[derive(Parser, Debug)]
#[command(
    name = "docai",
    version,
    about = "Analyse, crop, translate and summarise PDFs and page images",
    long_about = "Run a document through layout analysis, crop its figures and tables, extract \
per-page text, optionally translate it, and summarise pages and crops with an LLM. Supports \
OpenAI, Anthropic, Google Gemini, Ollama and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// One PDF, or page images in reading order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Input type; inferred from extensions when omitted.
    #[arg(long, value_enum)]
    filetype: Option<FileTypeArg>,

    /// Maximum pages per chunk sent to the analysis service.
    #[arg(long, env = "DOCAI_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,

    /// Language for translations and summaries.
    #[arg(long, env = "DOCAI_LANG", default_value = "English")]
    lang: String,

    /// Translate page text before summarising.
    #[arg(long, env = "DOCAI_TRANSLATE")]
    translate: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "DOCAI_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Concurrent LLM requests per batch.
    #[arg(short, long, env = "DOCAI_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Max LLM output tokens per request.
    #[arg(long, env = "DOCAI_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCAI_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Document-analysis endpoint URL.
    #[arg(long, env = "DOCAI_ANALYSIS_ENDPOINT")]
    analysis_endpoint: Option<String>,

    /// Zip the output folder after writing the reports.
    #[arg(long)]
    zip: bool,

    /// Remove chunk PDFs and analysis JSON after writing the reports.
    #[arg(long)]
    clean: bool,

    /// Print a JSON run summary to stdout.
    #[arg(long, env = "DOCAI_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCAI_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCAI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCAI_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FileTypeArg {
    Pdf,
    Image,
}

impl From<FileTypeArg> for SourceKind {
    fn from(v: FileTypeArg) -> Self {
        match v {
            FileTypeArg::Pdf => SourceKind::Pdf,
            FileTypeArg::Image => SourceKind::ImageSet,
        }
    }
}

/// What `--json` prints.
#[derive(Serialize)]
struct RunSummary {
    source: String,
    pages: usize,
    figures: usize,
    tables: usize,
    stages: Vec<Stage>,
    total_duration_ms: u64,
    reports: Vec<PathBuf>,
    archive: Option<PathBuf>,
    removed_files: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let input = DocumentInput {
        paths: cli.inputs.clone(),
        kind: cli.filetype.map(SourceKind::from),
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let output = process_document(&input, &config)
        .await
        .context("Pipeline failed")?;
    let state = &output.state;

    let reports = write_markdown_reports(state).context("Failed to write reports")?;
    let archive = if cli.zip {
        Some(
            create_archive(&state.scratch_dir(), &state.source_stem())
                .context("Failed to create archive")?,
        )
    } else {
        None
    };
    let removed_files = if cli.clean {
        clean_scratch(state).context("Failed to clean up")?
    } else {
        0
    };

    let summary = RunSummary {
        source: state.source_stem(),
        pages: state.page_numbers().map_or(0, Vec::len),
        figures: state.image_summaries().map_or(0, |m| m.len()),
        tables: state.table_summaries().map_or(0, |m| m.len()),
        stages: output.stats.executed(),
        total_duration_ms: output.stats.total_duration_ms,
        reports,
        archive,
        removed_files,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {} figures  {} tables  {}ms",
            green("✔"),
            summary.pages,
            summary.figures,
            summary.tables,
            summary.total_duration_ms,
        );
        for path in summary.reports.iter().chain(summary.archive.iter()) {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
        if summary.removed_files > 0 {
            eprintln!(
                "   {}",
                dim(&format!("{} intermediate files removed", summary.removed_files))
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .batch_size(cli.batch_size)
        .target_language(cli.lang.clone())
        .translate(cli.translate)
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref endpoint) = cli.analysis_endpoint {
        builder = builder.analysis_endpoint(endpoint.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
