// AutoGrep - main.rs
//
// CLI entry point. Handles:
// 1. Argument parsing
// 2. Logging initialisation (stderr; stdout carries JSON only)
// 3. SIGINT -> cooperative cancel
// 4. Exit codes: 0 completion, 2 archive format error, 3 unrecoverable
//    I/O or internal failure, 130 cancelled

use autogrep::util::{error::EngineError, logging};
use autogrep::{analyze, analyze_streaming, Options, ScanEvent};
use clap::Parser;
use std::path::PathBuf;

/// Offline log triage for GitLab SOS archives.
#[derive(Parser, Debug)]
#[command(name = "autogrep", version, about)]
struct Cli {
    /// Path to the support archive (.tar, .tar.gz, .tgz, .zip)
    archive: PathBuf,

    /// Number of scan workers (default: min(cores, 16))
    #[arg(long)]
    workers: Option<usize>,

    /// Cancel the run after this many matches
    #[arg(long)]
    max_matches: Option<u64>,

    /// Stream JSON events on stdout, one object per line
    #[arg(long, conflicts_with = "report")]
    json: bool,

    /// Print only the final JSON report on stdout (default)
    #[arg(long)]
    report: bool,

    /// Enable debug logging on stderr
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let options = Options {
        workers: cli.workers,
        max_matches: cli.max_matches,
        ..Options::default()
    };

    // SIGINT flips the shared cancel flag; workers drain and the run
    // returns EngineError::Cancelled.
    if let Err(e) =
        signal_hook::flag::register(signal_hook::consts::SIGINT, options.cancel.as_arc())
    {
        tracing::warn!(error = %e, "Cannot register SIGINT handler");
    }

    let result = if cli.json {
        analyze_streaming(&cli.archive, &options, emit_event)
    } else {
        analyze(&cli.archive, &options)
    };

    match result {
        Ok(report) => {
            if !cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        tracing::error!(error = %e, "Report serialisation failed");
                        return 3;
                    }
                }
            }
            0
        }
        Err(EngineError::Archive(e)) => {
            tracing::error!(error = %e, "Archive error");
            2
        }
        Err(EngineError::Cancelled) => {
            tracing::warn!("Cancelled");
            130
        }
        Err(e) => {
            tracing::error!(error = %e, "Analysis failed");
            3
        }
    }
}

/// One JSON object per line on stdout; serialisation problems are
/// logged, never allowed to corrupt the stream.
fn emit_event(event: &ScanEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Event serialisation failed"),
    }
}
