//! CLI binary for edgequake-img2report.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ReportConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_img2report::{
    process_images, BatchProgressCallback, BatchRequest, ProgressCallback, ReportConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the image currently being analysed.
    image_start: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many images there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving images…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            image_start: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }

    /// Clear the bar when the batch fails before `on_batch_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.image_start
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_images} images…"))
        ));
    }

    fn on_image_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut start) = self.image_start.lock() {
            *start = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, name: &str, text_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<24}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs();

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<24}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let failed = total_images.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images analysed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images analysed  ({} failed)",
                if failed == total_images { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a local folder; artifacts land beside the images
  img2report run ./photos --api-key app-...

  # Analyse a public Google Drive folder; artifacts land in ~/Downloads
  img2report run https://drive.google.com/drive/folders/<id> --api-key app-...

  # Machine-readable result
  img2report run ./photos --json > result.json

  # Host the HTTP API
  img2report serve --bind 0.0.0.0:8000

ENVIRONMENT VARIABLES:
  DIFY_API_KEY            Analysis service credential (for `run`)
  IMG2REPORT_API_BASE     Analysis service base URL
  IMG2REPORT_OUTPUT_DIR   Output directory for cloud sources
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Analyse batches of images and write spreadsheet + PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "img2report",
    version,
    about = "Analyse batches of images with a vision API and write xlsx + PDF reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMG2REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMG2REPORT_QUIET")]
    quiet: bool,

    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one batch and print the artifact paths.
    Run(RunArgs),
    /// Serve the HTTP API.
    #[cfg(feature = "server")]
    Serve {
        /// Address to bind.
        #[arg(long, env = "IMG2REPORT_BIND", default_value = "0.0.0.0:8000")]
        bind: std::net::SocketAddr,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Local folder path or cloud-drive share link.
    input: String,

    /// Treat INPUT as a share link even without an http(s) scheme.
    #[arg(long)]
    drive: bool,

    /// Analysis service credential.
    #[arg(long, env = "DIFY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Output structured JSON (BatchOutput) instead of the two paths.
    #[arg(long, env = "IMG2REPORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMG2REPORT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Analysis service base URL.
    #[arg(long, global = true, env = "IMG2REPORT_API_BASE")]
    api_base: Option<String>,

    /// Instruction sent with every image.
    #[arg(long, global = true, env = "IMG2REPORT_QUERY")]
    query: Option<String>,

    /// Output directory for cloud-drive sources (default: Downloads).
    #[arg(long, global = true, env = "IMG2REPORT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Upload timeout in seconds.
    #[arg(long, global = true, env = "IMG2REPORT_UPLOAD_TIMEOUT", default_value_t = 60)]
    upload_timeout: u64,

    /// Streamed analysis timeout in seconds.
    #[arg(long, global = true, env = "IMG2REPORT_ANALYZE_TIMEOUT", default_value_t = 300)]
    analyze_timeout: u64,

    /// Cloud-drive download timeout in seconds.
    #[arg(long, global = true, env = "IMG2REPORT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Run(run) => !cli.quiet && !run.no_progress && !run.json,
        #[cfg(feature = "server")]
        Command::Serve { .. } => false,
    };
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

    match &cli.command {
        Command::Run(run) => {
            let progress = show_progress.then(CliProgressCallback::new_dynamic);
            let progress_cb: Option<ProgressCallback> = progress
                .clone()
                .map(|cb| cb as Arc<dyn BatchProgressCallback>);
            let outcome = match build_config(&cli.service, progress_cb) {
                Ok(config) => run_batch(run, &config, cli.quiet).await,
                Err(e) => Err(e),
            };
            if outcome.is_err() {
                if let Some(ref cb) = progress {
                    cb.abandon();
                }
            }
            outcome
        }
        #[cfg(feature = "server")]
        Command::Serve { bind } => {
            let config = build_config(&cli.service, None)?;
            let state = edgequake_img2report::server::AppState::new(config);
            edgequake_img2report::server::serve(*bind, state)
                .await
                .context("Server failed")
        }
    }
}

async fn run_batch(run: &RunArgs, config: &ReportConfig, quiet: bool) -> Result<()> {
    let request = if run.drive || is_url(&run.input) {
        BatchRequest::cloud(&run.input, &run.api_key)
    } else {
        BatchRequest::local(&run.input, &run.api_key)
    };

    let output = process_images(&request, config)
        .await
        .context("Processing failed")?;

    if run.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", output.report_path.display());
    println!("{}", output.document_path.display());

    if !quiet {
        eprintln!(
            "{}  {}/{} images  {}ms  →  {}",
            if output.stats.failed == 0 { green("✔") } else { cyan("⚠") },
            output.stats.analyzed,
            output.stats.total_images,
            output.stats.total_duration_ms,
            bold(&output.message),
        );
        if output.stats.thumbnail_failures > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{} thumbnails replaced by placeholders",
                    output.stats.thumbnail_failures
                ))
            );
        }
    }
    Ok(())
}

fn is_url(input: &str) -> bool {
    input.starts_with("https://") || input.starts_with("http://")
}

/// Map CLI args to `ReportConfig`.
fn build_config(args: &ServiceArgs, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let mut builder = ReportConfig::builder()
        .upload_timeout_secs(args.upload_timeout)
        .analyze_timeout_secs(args.analyze_timeout)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref base) = args.api_base {
        builder = builder.api_base_url(base);
    }
    if let Some(ref query) = args.query {
        builder = builder.query(query);
    }
    if let Some(ref dir) = args.output_dir {
        builder = builder.default_output_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
