//! CLI binary for market-report.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GenerationConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use market_report::{
    generate_report_to_file, inspect, plan_sections, CancellationFlag, GenerationConfig, ProgressCallback,
    ReportInputs, ReportProgressCallback, ReportStats, SectionStatus, WatermarkSource,
};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the planned sections plus a log
/// line per finished or degraded section.
struct CliProgressCallback {
    bar: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            warnings: AtomicUsize::new(0),
        })
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total_sections: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>2}/{len} sections  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_sections as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Generating");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Building report with {total_sections} sections…"))
        ));
    }

    fn on_section_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_section_warning(&self, _index: usize, name: &str, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        let msg = if warning.chars().count() > 80 {
            format!("{}\u{2026}", warning.chars().take(79).collect::<String>())
        } else {
            warning.to_string()
        };
        self.bar
            .println(format!("  {} {:<28} {}", yellow("⚠"), name, dim(&msg)));
    }

    fn on_section_complete(&self, index: usize, total: usize, name: &str) {
        self.bar
            .println(format!("  {} {:>2}/{:<2} {}", green("✓"), index, total, name));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, page_count: usize, warning_count: usize) {
        self.bar.finish_and_clear();
        if warning_count == 0 {
            eprintln!("{} {} pages generated", green("✔"), bold(&page_count.to_string()));
        } else {
            eprintln!(
                "{} {} pages generated  ({} warnings)",
                yellow("⚠"),
                bold(&page_count.to_string()),
                warning_count
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate into the current directory
  market-report inputs.json

  # Into a reports folder, with a watermark logo
  market-report inputs.json -o reports --watermark logo.png

  # Inputs from stdin, JSON stats on stdout
  cat inputs.json | market-report - --json

  # Show the planned sections without generating
  market-report --plan-only inputs.json

  # Confirm the written PDF through pdfium
  market-report inputs.json --verify

INPUT FORMAT (camelCase JSON):
  report                   { country, city, cropType, currency, weight }
  selectedCropKeys         1 to 3 keys such as "kale-red_russian"
  priceTrends              [{ cropName, variety, historical, current, forecast }]
  topPerformers            [{ cropName, rank, priceRange, avgPrice, percentChange }]
  regionalDistribution     [{ label, percentage }]   (also productTypeDistribution,
                                                       marketPlayersByCategory)
  sentiment                [{ source, <crop>: <count>, … }]
  generatedOn              YYYY-MM-DD (defaults to today)

ENVIRONMENT VARIABLES:
  MARKET_REPORT_OUTPUT_DIR   Output directory
  MARKET_REPORT_WATERMARK    Watermark file path, URL or data URI
  PDFIUM_LIB_PATH            libpdfium location for --verify
  RUST_LOG                   Overrides the log filter
"#;

/// Generate market-intelligence PDF reports from JSON datasets.
#[derive(Parser, Debug)]
#[command(
    name = "market-report",
    version,
    about = "Generate crop market-intelligence PDF reports",
    long_about = "Assemble price trends, forecasts, distribution breakdowns and social-mention \
counts for up to three selected crops into a paginated A4 PDF report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Inputs JSON file, or `-` for stdin.
    input: String,

    /// Directory the report is written to.
    #[arg(short, long, env = "MARKET_REPORT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Watermark image: file path, http(s) URL or data URI.
    #[arg(long, env = "MARKET_REPORT_WATERMARK")]
    watermark: Option<String>,

    /// Watermark opacity (0.0–1.0).
    #[arg(long, env = "MARKET_REPORT_WATERMARK_OPACITY", default_value_t = 0.08)]
    watermark_opacity: f32,

    /// Chart supersampling scale (1–4).
    #[arg(long, env = "MARKET_REPORT_SCALE", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..=4))]
    scale: u32,

    /// Seconds to wait for each chart capture; 0 waits forever.
    #[arg(long, env = "MARKET_REPORT_CAPTURE_TIMEOUT", default_value_t = 10)]
    capture_timeout: u64,

    /// Historical and forecast rows per crop trend table.
    #[arg(long, env = "MARKET_REPORT_TREND_ROWS", default_value_t = 3)]
    trend_rows: usize,

    /// Footer caption replacing the default location and period line.
    #[arg(long, env = "MARKET_REPORT_CAPTION")]
    caption: Option<String>,

    /// HTTP download timeout in seconds (watermark URLs).
    #[arg(long, env = "MARKET_REPORT_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Print generation stats as JSON on stdout.
    #[arg(long, env = "MARKET_REPORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MARKET_REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Print the planned sections only, no generation.
    #[arg(long)]
    plan_only: bool,

    /// Re-open the written PDF through pdfium and check page count and size.
    #[arg(long)]
    verify: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MARKET_REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MARKET_REPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let inputs = read_inputs(&cli.input).await?;

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan_only {
        let sections = plan_sections(&inputs).context("Invalid crop selection")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&sections).context("Failed to serialise plan")?
            );
        } else {
            for (i, name) in sections.iter().enumerate() {
                println!("{:>2}. {}", i + 1, name);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", yellow("Cancelling after the current section…"));
                cancel.cancel();
            }
        });
    }
    let config = build_config(&cli, progress_cb, cancel)?;

    // ── Generate ─────────────────────────────────────────────────────────
    let (path, stats) = generate_report_to_file(&inputs, &cli.output_dir, &config)
        .await
        .context("Report generation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        print_summary(&stats, &path);
    }

    // ── Verify ───────────────────────────────────────────────────────────
    if cli.verify {
        let info = inspect(&path).await.context("Failed to re-open the written report")?;
        if info.page_count != stats.page_count {
            bail!(
                "Verification failed: wrote {} pages but pdfium reads {}",
                stats.page_count,
                info.page_count
            );
        }
        if !info.is_a4_portrait() {
            bail!("Verification failed: pages are not A4 portrait ({:?})", info.page_sizes_mm);
        }
        if !cli.quiet {
            eprintln!(
                "{} verified: {} pages, {}",
                green("✔"),
                info.page_count,
                dim(&info.pdf_version)
            );
        }
    }

    Ok(())
}

async fn read_inputs(input: &str) -> Result<ReportInputs> {
    let raw = if input == "-" {
        tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map(|_| buf)
        })
        .await
        .context("stdin reader failed")?
        .context("Failed to read inputs from stdin")?
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read inputs from {:?}", input))?
    };
    serde_json::from_str(&raw).context("Inputs are not valid report JSON")
}

/// Map CLI args to `GenerationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>, cancel: CancellationFlag) -> Result<GenerationConfig> {
    let timeout = (cli.capture_timeout > 0).then(|| Duration::from_secs(cli.capture_timeout));
    let mut builder = GenerationConfig::builder()
        .capture_scale(cli.scale)
        .capture_timeout(timeout)
        .trend_rows_per_series(cli.trend_rows)
        .watermark_opacity(cli.watermark_opacity)
        .download_timeout_secs(cli.download_timeout)
        .cancellation(cancel);

    if let Some(ref source) = cli.watermark {
        builder = builder.watermark(WatermarkSource::parse(source));
    }
    if let Some(ref caption) = cli.caption {
        builder = builder.footer_caption(caption.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(stats: &ReportStats, path: &std::path::Path) {
    let degraded = stats
        .sections
        .iter()
        .filter(|s| s.status == SectionStatus::Degraded)
        .count();
    eprintln!(
        "{}  {} pages  {} charts  {}ms  →  {}",
        if degraded == 0 { green("✔") } else { yellow("⚠") },
        stats.page_count,
        stats.charts_embedded,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    for w in &stats.warnings {
        eprintln!("   {} {}: {}", yellow("⚠"), w.section, dim(&w.error.to_string()));
    }
}
