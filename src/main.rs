use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use clap::Parser;
use refscan::{
    analyze_path, write_report, AnalyzerConfig, AnalyzerError, ExitStatus, LogFormat,
    ReportFilter, DEFAULT_LOG_PATH, EXIT_CANCELLED, EXIT_USAGE,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Set from the signal handler; polled between input lines.
static CANCELLED: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(
    name = "refscan",
    about = "Reconstruct object lifetimes from a reference-count debug log"
)]
struct Cli {
    /// Reference debug log to analyse.
    #[arg(default_value = DEFAULT_LOG_PATH)]
    input: PathBuf,
    /// Do not report over-released or use-after-free objects.
    #[arg(long)]
    suppress_invalid: bool,
    /// Do not report leaked objects.
    #[arg(long)]
    suppress_leaks: bool,
    /// Do not report cleanly released objects.
    #[arg(long)]
    suppress_normal: bool,
    /// Do not report objects observed from mid-lifetime.
    #[arg(long)]
    suppress_skewed: bool,
    /// Do not report objects held only through other live objects.
    #[arg(long)]
    suppress_indirect: bool,
    /// Treat every pointer-tagged reference as untracked.
    #[arg(long)]
    ignore_pointers: bool,
    /// Drop balanced addresses in a first pass (requires --suppress-normal).
    #[arg(long)]
    preprocess: bool,
    /// Log format: auto, legacy (8 fields) or pointer (9 fields).
    #[arg(long, default_value = "auto")]
    format: LogFormat,
    /// Enable debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn filter(&self) -> ReportFilter {
        ReportFilter::all()
            .with_invalid(!self.suppress_invalid)
            .with_leaked(!self.suppress_leaks)
            .with_normal(!self.suppress_normal)
            .with_skewed(!self.suppress_skewed)
            .with_indirect(!self.suppress_indirect)
    }

    fn config(&self) -> AnalyzerConfig {
        AnalyzerConfig::new()
            .with_format(self.format)
            .with_pointer_tracking(!self.ignore_pointers)
            .with_preprocess(self.preprocess)
            .with_filter(self.filter())
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose);
    install_interrupt_handler();

    let code = match run(&cli) {
        Ok(status) => status.code(),
        Err(err) if is_cancelled(&err) => {
            eprintln!("processing cancelled");
            EXIT_CANCELLED
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<ExitStatus> {
    let config = cli.config();
    let filter = config.filter;

    let analysis = analyze_path(&cli.input, config, &CANCELLED, |err| eprintln!("{err}"))
        .with_context(|| format!("failed to analyse {}", cli.input.display()))?;
    if CANCELLED.load(Ordering::SeqCst) {
        bail!(AnalyzerError::Cancelled);
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_report(&mut out, &analysis.buckets, &filter).context("failed to write report")?;

    let stats = analysis.stats;
    info!(
        lines = stats.lines,
        events = stats.events,
        malformed = stats.malformed,
        objects = stats.objects,
        "analysis complete"
    );
    Ok(ExitStatus::from_buckets(&analysis.buckets, &filter))
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<AnalyzerError>(),
        Some(AnalyzerError::Cancelled)
    )
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[cfg(unix)]
fn install_interrupt_handler() {
    extern "C" fn on_interrupt(_signal: libc::c_int) {
        CANCELLED.store(true, Ordering::SeqCst);
    }

    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only performs an atomic store, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
fn install_interrupt_handler() {}
