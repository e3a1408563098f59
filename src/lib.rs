//! scan-autocrop - page detection, deskew and black-border removal
//!
//! Straightens photographed or scanned document pages and removes the dark
//! scanner bed left around them, one image at a time or in parallel batches.
//!
//! # Features
//!
//! - **Correction** ([`correction`]) - Binarize, detect the page, rotate and refine borders
//! - **Pipeline** ([`pipeline`]) - Per-image state machine and parallel batch runner
//! - **Output** ([`output`]) - Image discovery, mirrored output layout and thumbnails
//! - **Reports** ([`report`]) - `run.json` metadata and the HTML thumbnail report
//! - **Config** ([`config`]) - TOML configuration merged with CLI overrides
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scan_autocrop::{CorrectionOptions, NoopObserver, PageCorrector};
//!
//! let image = image::open("scan.tif").unwrap().to_rgb8();
//! let corrector = PageCorrector::new(CorrectionOptions::default()).unwrap();
//! let outcome = corrector.process_image(&image, &NoopObserver).unwrap();
//! if outcome.is_fallback() {
//!     println!("kept original");
//! }
//! outcome.final_image.save("page.tif").unwrap();
//! ```
//!
//! # Architecture
//!
//! ```text
//! Load -> Binarize -> Detect region -> Rotate + crop -> Refine borders -> Save
//!                          |
//!                   (no region: keep original)
//! ```

pub mod cli;
pub mod config;
pub mod correction;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use cli::{create_progress_bar, Cli, Commands, ExitCode, ProcessArgs};
pub use config::{CliOverrides, Config, ConfigError, Settings};
pub use correction::{
    BinarizationMode, CorrectionError, CorrectionOptions, DetectionMode, FillColorPolicy, Region,
};
pub use output::{discover_images, OutputError, OutputLayout};
pub use pipeline::{
    BatchJob, BatchOptions, BatchProcessor, FallbackReason, NoopObserver, PageCorrector,
    PageOutcome, PageRecord, PageStatus, PipelineError, PipelineState, ProgressCallback,
    SilentProgress, StageImage, StepObserver, TracingObserver,
};
pub use progress::{BatchProgress, OutputMode, ProgressTracker};
pub use report::{ReportError, RunMetadata, RunTotals};
