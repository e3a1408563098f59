//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::correction::{BinarizationMode, DetectionMode, FillColorPolicy};

/// Exit codes for the CLI
///
/// These codes follow standard Unix conventions and provide
/// specific error categories for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 2,
    /// Input file or directory missing, or no images in it
    InputNotFound = 3,
    /// Output directory could not be written
    OutputError = 4,
    /// At least one image failed
    ProcessingError = 5,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::InvalidArgs => "Invalid arguments",
            ExitCode::InputNotFound => "Input file or directory not found",
            ExitCode::OutputError => "Output error (permission denied, disk full, etc.)",
            ExitCode::ProcessingError => "One or more images failed",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Page detection, deskew and black-border removal for scanned documents
#[derive(Parser, Debug)]
#[command(name = "scan-autocrop")]
#[command(author = "scan-autocrop contributors")]
#[command(version)]
#[command(about = "Page detection, deskew and black-border removal for scanned documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Straighten and crop every image under a directory
    Process(ProcessArgs),
    /// Show system information
    Info,
}

/// Arguments for the process command
#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Input image or directory (searched recursively)
    pub input: PathBuf,

    /// Output directory (mirrors the input layout)
    pub output: PathBuf,

    /// Outward margin around the detected page in pixels
    #[arg(short, long)]
    pub border: Option<u32>,

    /// Region shape: box or polygon
    #[arg(long)]
    pub detection: Option<DetectionMode>,

    /// Foreground polarity: standard (light page) or inverted (dark page)
    #[arg(long)]
    pub binarization: Option<BinarizationMode>,

    /// Canvas fill: estimated, white, black or R,G,B
    #[arg(long)]
    pub fill: Option<FillColorPolicy>,

    /// Keep the original when the output covers at most this fraction of it
    #[arg(long)]
    pub min_area_ratio: Option<f64>,

    /// Number of parallel threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Skip side-by-side thumbnails
    #[arg(long)]
    pub no_thumbnails: bool,

    /// Skip the HTML report
    #[arg(long)]
    pub no_report: bool,

    /// Save the un-rotated reference crop next to each output
    #[arg(long)]
    pub save_reference: bool,

    /// Config file (overrides the search path)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Show execution plan without processing
    #[arg(long)]
    pub dry_run: bool,
}

impl ProcessArgs {
    /// Overrides for values given explicitly on the command line
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            border_margin: self.border,
            binarization: self.binarization,
            detection: self.detection,
            fill: self.fill,
            min_area_ratio: self.min_area_ratio,
            threads: self.threads,
            thumbnails: self.no_thumbnails.then_some(false),
            report: self.no_report.then_some(false),
            save_reference: self.save_reference.then_some(true),
        }
    }
}

/// Create a styled progress bar for file processing
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
