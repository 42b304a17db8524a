//! CLI binary for payslip-waterfall.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the reconciled waterfall.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use payslip_waterfall::{
    extract_with_stats, recover_and_validate, reconcile, ExtractionConfig,
    ExtractionError, ExtractionProgressCallback, ExtractionStats, PayslipRecord, ProgressCallback,
    RawDocument, ReconciledWaterfall, ResponseMode, Stage, View,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner whose message follows the
/// current pipeline stage, plus a log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Payslip");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<20} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{elapsed_ms}ms"))
        ));
        if stage == Stage::Validate {
            self.bar.finish_and_clear();
        }
    }

    fn on_failure(&self, stage: Stage, _message: &str) {
        self.bar
            .println(format!("  {} {}", red("✘"), stage.label()));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract and show the cascade view
  payslip fiche_de_paie.pdf

  # Detailed per-category view from a photo
  payslip --view detailed bulletin.jpg

  # JSON export (record + waterfall)
  payslip --json fiche_de_paie.pdf > paie.json

  # Free-text mode through another provider
  payslip --mode text --provider anthropic --model claude-sonnet-4-20250514 fiche.pdf

  # Re-run recovery, validation and reconciliation on a saved model answer
  payslip --record answer.txt

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (strict tool-call backend)
  OPENAI_BASE_URL         OpenAI-compatible endpoint for the tool-call backend
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise the system library is used)

PRIVACY:
  Nothing is written to disk. The document and its rendered image only live
  for the duration of the extraction call.
"#;

/// Read a French payslip with a Vision LLM and show where superGross goes.
#[derive(Parser, Debug)]
#[command(
    name = "payslip",
    version,
    about = "Read a French payslip with a Vision LLM and show the superGross → net waterfall",
    long_about = "Read a French payslip (PDF, PNG or JPEG) with a Vision Language Model, \
validate the extracted figures and reconcile them into a superGross → net waterfall. \
Supports any OpenAI-compatible endpoint for strict function calling, and every \
edgequake-llm provider (OpenAI, Anthropic, Gemini, Ollama, …) in free-text mode.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Payslip file: PDF (first page only), PNG or JPEG.
    #[arg(required_unless_present = "record", conflicts_with = "record")]
    input: Option<PathBuf>,

    /// Skip the model call: recover, validate and reconcile a saved model answer.
    #[arg(long, env = "PAYSLIP_RECORD")]
    record: Option<PathBuf>,

    /// Output JSON ({record, waterfall, stats}) instead of tables.
    #[arg(long, env = "PAYSLIP_JSON")]
    json: bool,

    /// Which waterfall view to print.
    #[arg(long, env = "PAYSLIP_VIEW", value_enum, default_value = "cascade")]
    view: ViewArg,

    /// LLM model identifier (default: gpt-4o).
    #[arg(short, long, env = "PAYSLIP_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, …).
    #[arg(long, env = "PAYSLIP_PROVIDER")]
    provider: Option<String>,

    /// Response channel: forced function call, or free text.
    #[arg(long, env = "PAYSLIP_MODE", value_enum, default_value = "tool")]
    mode: ModeArg,

    /// OpenAI-compatible base URL for the tool-call backend.
    #[arg(long, env = "PAYSLIP_API_BASE")]
    api_base: Option<String>,

    /// API key for the tool-call backend (default: OPENAI_API_KEY).
    #[arg(long, env = "PAYSLIP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// PDF page upscaling factor (1.0–4.0).
    #[arg(long, env = "PAYSLIP_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Maximum tokens the model may generate.
    #[arg(long, env = "PAYSLIP_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PAYSLIP_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Model call timeout in seconds.
    #[arg(long, env = "PAYSLIP_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a libpdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// File with replacement instructions for the model.
    #[arg(long, env = "PAYSLIP_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "PAYSLIP_NO_PROGRESS")]
    no_progress: bool,

    /// Verbose logging (debug level).
    #[arg(short, long, env = "PAYSLIP_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "PAYSLIP_QUIET")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ViewArg {
    Cascade,
    Detailed,
}

impl From<ViewArg> for View {
    fn from(v: ViewArg) -> Self {
        match v {
            ViewArg::Cascade => View::Cascade,
            ViewArg::Detailed => View::Detailed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Tool,
    Text,
}

impl From<ModeArg> for ResponseMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Tool => ResponseMode::ToolCall,
            ModeArg::Text => ResponseMode::FreeText,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs quiet
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.record.is_none();
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

    // ── Offline mode ─────────────────────────────────────────────────────
    if let Some(ref path) = cli.record {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read model answer from {:?}", path))?;
        let record = match recover_and_validate(&text) {
            Ok(record) => record,
            Err(e) => fail(&e),
        };
        return print_result(&cli, &record, &reconcile(&record), None);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let Some(ref input) = cli.input else {
        anyhow::bail!("an input file or --record is required");
    };
    let doc = match RawDocument::from_path(input) {
        Ok(doc) => doc,
        Err(e) => fail(&e),
    };
    let output = match extract_with_stats(doc, &config).await {
        Ok(output) => output,
        Err(e) => fail(&e),
    };

    let waterfall = reconcile(&output.record);
    print_result(&cli, &output.record, &waterfall, Some(&output.stats))
}

/// Print the one user-facing message for this failure and exit.
///
/// The full error goes to the log, not the terminal.
fn fail(e: &ExtractionError) -> ! {
    tracing::error!("{e}");
    eprintln!("{} {}", red("✘"), bold(e.kind().user_message()));
    std::process::exit(1);
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .render_scale(cli.scale)
        .response_mode(cli.mode.into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_result(
    cli: &Cli,
    record: &PayslipRecord,
    waterfall: &ReconciledWaterfall,
    stats: Option<&ExtractionStats>,
) -> Result<()> {
    if cli.json {
        let json = serde_json::json!({
            "record": record,
            "waterfall": waterfall,
            "stats": stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
        return Ok(());
    }

    println!("{}  {}", bold(&record.employee_name), dim(&record.period));
    println!();
    for figure in waterfall.headline.figures() {
        println!(
            "  {:<18} {:>12}  {:>7}",
            figure.label,
            euros(figure.amount),
            percent(figure.percentage_of_super_gross)
        );
    }
    println!();

    let view = View::from(cli.view);
    let title = match view {
        View::Cascade => "Vue cascade",
        View::Detailed => "Vue détaillée",
    };
    println!("{}", cyan(title));
    for entry in waterfall.rows(view) {
        println!(
            "  {:<32} {:>12}  {:>7}",
            entry.label,
            euros(entry.amount),
            percent(entry.percentage_of_super_gross)
        );
    }
    if view == View::Detailed {
        println!();
        for d in &waterfall.detailed {
            if let Some(split) = d.split {
                println!(
                    "  {:<32} {}",
                    d.entry.label,
                    dim(&format!(
                        "salarié {}  /  employeur {}",
                        euros(split.employee),
                        euros(split.employer)
                    ))
                );
            }
        }
    }

    if !waterfall.discrepancies.is_empty() {
        println!();
        println!("{}", yellow("Écarts détectés :"));
        for d in &waterfall.discrepancies {
            println!(
                "  {} {}: déclaré {}, recalculé {}",
                yellow("⚠"),
                d.path,
                euros(d.reported),
                euros(d.computed)
            );
        }
    }

    println!();
    println!("{}", waterfall.narrative());

    if let Some(stats) = stats {
        if !cli.quiet {
            eprintln!(
                "   {} · {} tokens in  /  {} tokens out  ·  {}ms total",
                dim(&stats.backend),
                dim(&stats.input_tokens.to_string()),
                dim(&stats.output_tokens.to_string()),
                stats.total_ms,
            );
        }
    }
    Ok(())
}

fn euros(amount: f64) -> String {
    format!("{amount:.2} €")
}

fn percent(p: f64) -> String {
    if p.is_nan() {
        "n/a".to_string()
    } else {
        format!("{p:.1}%")
    }
}
