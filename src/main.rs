//! scan-autocrop - page detection, deskew and black-border removal
//!
//! CLI entry point

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use scan_autocrop::config::LOCAL_CONFIG_FILE;
use scan_autocrop::output::{THUMBNAIL_DIR, SUPPORTED_EXTENSIONS};
use scan_autocrop::report::{self, REPORT_FILE, RUN_FILE};
use scan_autocrop::{
    discover_images, BatchJob, BatchProcessor, BatchProgress, Cli, Commands, Config, ConfigError,
    CorrectionError, ExitCode, OutputError, OutputLayout, OutputMode, PageCorrector,
    ProcessArgs, ProgressTracker, ReportError, RunMetadata, Settings, TracingObserver,
};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process(args) => {
            init_tracing(args.verbose, args.quiet);
            run_process(&args)
        }
        Commands::Info => run_info().map(|()| ExitCode::Success),
    };

    std::process::exit(match result {
        Ok(code) => code.code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e).code()
        }
    });
}

/// `RUST_LOG` wins; otherwise `-v`/`-vv`/`--quiet` pick the level
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Map the root cause of a failed run to an exit code
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<OutputError>() {
            return match e {
                OutputError::InputNotFound(_) | OutputError::NoImages(_) => ExitCode::InputNotFound,
                OutputError::PathCollision { .. } => ExitCode::InvalidArgs,
                OutputError::Io(_) | OutputError::Image(_) => ExitCode::OutputError,
            };
        }
        if cause.is::<ConfigError>() || cause.is::<CorrectionError>() {
            return ExitCode::InvalidArgs;
        }
        if cause.is::<ReportError>() || cause.is::<std::io::Error>() {
            return ExitCode::OutputError;
        }
    }
    ExitCode::GeneralError
}

// ============ Process Command ============

fn run_process(args: &ProcessArgs) -> Result<ExitCode> {
    let started_at = Local::now();

    let file_config = match &args.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };
    let settings = file_config.merge_with_cli(&args.overrides())?;
    let corrector = PageCorrector::new(settings.correction.clone())?;

    let images = discover_images(&args.input, Some(&args.output))?;
    if images.is_empty() {
        return Err(OutputError::NoImages(args.input.clone()).into());
    }

    let mut layout = OutputLayout::new(&args.input, &args.output)
        .with_reference(settings.batch.save_reference);
    if !settings.batch.thumbnails {
        layout = layout.without_thumbnails();
    }
    let jobs = layout.plan(&images)?;

    if args.dry_run {
        print_execution_plan(args, &settings, &jobs);
        return Ok(ExitCode::Success);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mode = OutputMode::from_flags(args.verbose, args.quiet);
    let progress = BatchProgress::new(jobs.len(), mode);
    let processor = BatchProcessor::new(corrector, settings.batch.clone());
    let records = processor.run(&jobs, &progress, &TracingObserver)?;
    progress.finish();

    let metadata = RunMetadata::new(
        started_at,
        &args.input,
        &args.output,
        Config::from_settings(&settings),
        records,
    );
    metadata
        .save(&args.output.join(RUN_FILE))
        .context("writing run metadata")?;
    if settings.batch.report {
        let path = args.output.join(REPORT_FILE);
        report::write_html(&path, &metadata).context("writing HTML report")?;
        info!(path = %path.display(), "HTML report generated");
    }

    let totals = metadata.totals;
    if mode.should_show(OutputMode::Normal) {
        ProgressTracker::print_summary(totals.total, totals.corrected, totals.fallback, totals.failed);
        println!("Total time: {:.2}s", metadata.elapsed_secs);
    }

    if totals.failed > 0 {
        warn!(failed = totals.failed, "Some images failed");
        return Ok(ExitCode::ProcessingError);
    }
    Ok(ExitCode::Success)
}

/// Print execution plan for dry-run mode
fn print_execution_plan(args: &ProcessArgs, settings: &Settings, jobs: &[BatchJob]) {
    let correction = &settings.correction;
    let batch = &settings.batch;

    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input: {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Images to process: {}", jobs.len());
    println!();
    println!("Correction:");
    println!("  1. Binarization: {}", correction.binarization.name());
    println!("  2. Detection: {}", correction.detection.name());
    println!("  3. Rotation fill: {:?}", correction.fill);
    println!("  4. Border margin: {} px", correction.border_margin);
    if correction.min_area_ratio > 0.0 {
        println!("  5. Area fallback: at most {:.0}% of the original", correction.min_area_ratio * 100.0);
    } else {
        println!("  5. Area fallback: DISABLED");
    }
    println!();
    println!("Batch:");
    println!("  Threads: {}", batch.thread_count());
    println!("  Thumbnails: {}", if batch.thumbnails { "YES" } else { "NO" });
    println!("  HTML report: {}", if batch.report { "YES" } else { "NO" });
    println!("  Reference crops: {}", if batch.save_reference { "YES" } else { "NO" });
    println!();
    println!("Files:");
    for (i, job) in jobs.iter().enumerate() {
        println!("  {}. {} -> {}", i + 1, job.input.display(), job.output.display());
    }
}

// ============ Info Command ============

fn run_info() -> Result<()> {
    println!("scan-autocrop v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    if let Some(gb) = total_memory_gb() {
        println!("  Memory: {:.1} GB", gb);
    }

    println!();
    println!("Supported Inputs:");
    println!("  Extensions: {}", SUPPORTED_EXTENSIONS.join(", "));
    println!("  Thumbnails: <output>/{}/", THUMBNAIL_DIR);

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let label = if path == PathBuf::from(LOCAL_CONFIG_FILE) {
            "Local"
        } else {
            "User "
        };
        println!("  {}: {}{}", label, path.display(), found_marker(&path));
    }

    Ok(())
}

fn found_marker(path: &Path) -> &'static str {
    if path.exists() {
        " (found)"
    } else {
        ""
    }
}

fn total_memory_gb() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb as f64 / 1_048_576.0)
}
