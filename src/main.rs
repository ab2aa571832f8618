use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sigdrift::server::run_stdio_server;
use sigdrift::tracker::{FunctionTracker, ScanReport};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "sigdrift")]
#[command(version)]
#[command(about = "Track function signature changes and rewrite their call sites (Python, JavaScript, TypeScript)")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Compact single-line JSON instead of pretty-printed output
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index every definition and call site under ROOT and print the scan report
    Scan {
        #[arg(value_name = "ROOT", default_value = ".")]
        root: PathBuf,
    },
    /// Compare an updated definition against the index of ROOT and print call-site rewrites
    Detect {
        /// Repository root to index first
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// File the definition belongs to (relative to ROOT); its extension selects the language
        #[arg(long, value_name = "FILE_PATH")]
        file: String,

        /// Read the updated code from this path instead of stdin
        #[arg(long, value_name = "CODE_PATH")]
        code: Option<PathBuf>,

        /// Check every function header in the code, not only the first
        #[arg(long)]
        all: bool,
    },
    /// Start MCP stdio server
    Mcp,
}

/// Initialize tracing subscriber. Stdout carries JSON, so logs go to stderr.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{text}");
    Ok(())
}

fn scan_with_spinner(tracker: &FunctionTracker, root: &Path) -> Result<ScanReport> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(format!("scanning {}...", root.display()));

    let report = tracker
        .scan(root)
        .with_context(|| format!("Failed to scan {}", root.display()));
    match &report {
        Ok(r) => spinner.finish_with_message(format!(
            "scanned {} files, {} functions",
            r.files_scanned,
            r.definitions.len()
        )),
        Err(_) => spinner.finish_and_clear(),
    }
    report
}

fn read_code(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read code from stdin")?;
            Ok(buf)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Mcp => run_stdio_server(),
        Command::Scan { root } => {
            let tracker = FunctionTracker::new();
            let report = scan_with_spinner(&tracker, &root)?;
            print_json(&report, cli.compact)
        }
        Command::Detect { root, file, code, all } => {
            let code = read_code(code.as_deref())?;
            let tracker = FunctionTracker::new();
            scan_with_spinner(&tracker, &root)?;
            let report = if all {
                tracker.detect_file_changes(&file, &code)
            } else {
                tracker.detect_change(&file, &code)
            };
            print_json(&report, cli.compact)
        }
    }
}
