//! connascence CLI
//!
//! Scans a Rust project for connascence, duplication and safety-rule
//! violations and writes a JSON, SARIF or Markdown report.
//!
//! Usage:
//!   connascence scan [OPTIONS] <PATH>
//!
//! Exit codes: 0 success, 1 blocking violations or exceeded budget,
//! 2 configuration error, 3 invalid arguments, 130 interrupted.

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing::info;

use connascence::{
    DetectorRegistry, Orchestrator, OutputFormat, ScanVerdict, Severity, exit_code, load_policy,
    telemetry::init_tracing, write_report,
};

/// connascence - coupling, duplication and safety-rule analysis for Rust code
#[derive(Parser, Debug)]
#[command(name = "connascence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a file or directory
    Scan(ScanArgs),
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// File or directory to analyze
    path: PathBuf,

    /// Policy preset name or policy file (default: search for .connascence.toml)
    #[arg(short, long)]
    policy: Option<String>,

    /// Output format: json, sarif or markdown
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Fail when any violation is at or above this severity
    #[arg(long, default_value = "high", value_parser = parse_severity)]
    fail_on: Severity,

    /// Output file for the report (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of worker threads (default: all CPU cores)
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Directory for the on-disk parse cache
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    Severity::parse(s).ok_or_else(|| {
        format!(
            "unknown severity '{}' (expected critical, high, medium, low or info)",
            s
        )
    })
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_code::SUCCESS,
                _ => exit_code::INVALID_ARGS,
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(exit_code::CONFIG_ERROR);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let Commands::Scan(args) = cli.command;
    init_tracing(args.verbose);

    if args.jobs == Some(0) {
        eprintln!("Error: --jobs must be at least 1");
        return Ok(exit_code::INVALID_ARGS);
    }
    if !args.path.exists() {
        eprintln!("Error: path '{}' does not exist", args.path.display());
        return Ok(exit_code::INVALID_ARGS);
    }

    let mut policy = load_policy(args.policy.as_deref(), &args.path)?;
    if let Some(jobs) = args.jobs {
        policy.analysis.workers = Some(jobs);
    }
    if let Some(dir) = &args.cache_dir {
        policy.cache.directory = Some(dir.clone());
    }
    if args.verbose {
        eprintln!(
            "Policy '{}' with {} worker thread(s)",
            policy.name,
            policy.analysis.effective_workers()
        );
    }

    eprintln!("Analyzing '{}'...", args.path.display());
    let start = Instant::now();
    let registry = DetectorRegistry::standard(&policy);
    let orchestrator = Orchestrator::new(policy, registry)?;
    let report = orchestrator.run(std::slice::from_ref(&args.path));
    let elapsed = start.elapsed();

    info!(elapsed_ms = elapsed.as_millis() as u64, "scan finished");
    eprintln!(
        "Analysis complete: {} files, {} violations, quality {:.2} (took {:.2?})",
        report.metadata.files_analyzed,
        report.total_violations(),
        report.metrics.quality_score,
        elapsed
    );

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(stdout()),
    };
    let mut writer = output;
    write_report(&report, args.format, &mut writer)?;
    writer.flush()?;

    if let Some(path) = &args.output {
        eprintln!("Report written to: {}", path.display());
    }

    let verdict = ScanVerdict::evaluate(&report, args.fail_on);
    eprintln!("{}", verdict);
    Ok(verdict.exit_code)
}
