//! Pipeline processing module
//!
//! Sequences the correction stages for one image and runs batches of
//! images in parallel.
//!
//! ## Processing Steps
//!
//! 1. Load (decode and convert to RGB)
//! 2. Binarize
//! 3. Detect page region (missing region keeps the original)
//! 4. Rotate and crop
//! 5. Refine black borders
//! 6. Save outputs
//!
//! A failing image never stops the batch; it is recorded as failed.

use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::correction::{
    binarize, correct, detect_region, refine, BinaryMask, CorrectionError, CorrectionOptions,
    Region,
};
use crate::output::{self, OutputError};

// ============================================================
// States and Observers
// ============================================================

/// Stage reached by one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Loaded,
    Binarized,
    RegionDetected,
    RegionMissing,
    Warped,
    Refined,
    Saved,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Loaded => "loaded",
            PipelineState::Binarized => "binarized",
            PipelineState::RegionDetected => "region_detected",
            PipelineState::RegionMissing => "region_missing",
            PipelineState::Warped => "warped",
            PipelineState::Refined => "refined",
            PipelineState::Saved => "saved",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Buffer handed to a [`StepObserver`]
#[derive(Debug, Clone, Copy)]
pub enum StageImage<'a> {
    Color(&'a RgbImage),
    Mask(&'a BinaryMask),
}

impl StageImage<'_> {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            StageImage::Color(image) => image.dimensions(),
            StageImage::Mask(mask) => mask.dimensions(),
        }
    }
}

/// Diagnostic hook called after every stage
///
/// Observers only look; they cannot change the outcome.
pub trait StepObserver: Send + Sync {
    fn on_stage(&self, state: PipelineState, image: StageImage<'_>);
}

/// Observer that ignores every stage
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_stage(&self, _state: PipelineState, _image: StageImage<'_>) {}
}

/// Observer that logs every stage at trace level
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_stage(&self, state: PipelineState, image: StageImage<'_>) {
        let (width, height) = image.dimensions();
        trace!(state = state.name(), width, height, "Stage finished");
    }
}

// ============================================================
// Single Image
// ============================================================

/// Why the original image was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No page-like region in the mask
    RegionMissing,
    /// Crop collapsed after clamping
    DegenerateCrop,
    /// Output too small compared to the original
    AreaRatio,
}

impl FallbackReason {
    pub fn name(&self) -> &'static str {
        match self {
            FallbackReason::RegionMissing => "region_missing",
            FallbackReason::DegenerateCrop => "degenerate_crop",
            FallbackReason::AreaRatio => "area_ratio",
        }
    }
}

/// Result of correcting one image
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// Image to persist
    pub final_image: RgbImage,
    /// Untouched input
    pub original: RgbImage,
    /// Un-rotated crop of the detected region, for quality comparison
    pub reference: Option<RgbImage>,
    /// Set when the original was kept
    pub fallback: Option<FallbackReason>,
    /// Applied rotation in degrees
    pub angle: Option<f64>,
    pub region: Option<Region>,
    pub border_color: [u8; 3],
    pub threshold: u8,
}

impl PageOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Single-image page corrector
#[derive(Debug, Clone)]
pub struct PageCorrector {
    options: CorrectionOptions,
}

impl PageCorrector {
    /// Create a corrector, rejecting invalid options
    pub fn new(options: CorrectionOptions) -> Result<Self, CorrectionError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CorrectionOptions {
        &self.options
    }

    /// Run every correction stage on one image
    ///
    /// A missing region or a degenerate crop keeps the original and flags
    /// the outcome as a fallback. Other errors abort this image only.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process_image(
        &self,
        image: &RgbImage,
        observer: &dyn StepObserver,
    ) -> Result<PageOutcome, CorrectionError> {
        let options = &self.options;
        observer.on_stage(PipelineState::Loaded, StageImage::Color(image));

        let binarization = binarize(image, options.binarization)?;
        observer.on_stage(PipelineState::Binarized, StageImage::Mask(&binarization.mask));

        let keep_original = |reason: FallbackReason| PageOutcome {
            final_image: image.clone(),
            original: image.clone(),
            reference: None,
            fallback: Some(reason),
            angle: None,
            region: None,
            border_color: binarization.border_color,
            threshold: binarization.threshold,
        };

        let Some(region) = detect_region(&binarization.mask, options.detection) else {
            observer.on_stage(PipelineState::RegionMissing, StageImage::Color(image));
            info!("No page region found, keeping original");
            return Ok(keep_original(FallbackReason::RegionMissing));
        };
        observer.on_stage(PipelineState::RegionDetected, StageImage::Color(image));

        let fill = options.fill.resolve(binarization.border_color);
        let correction = match correct(image, &region, options.border_margin, fill) {
            Ok(correction) => correction,
            Err(CorrectionError::DegenerateCrop { width, height }) => {
                warn!(width, height, "Degenerate crop, keeping original");
                return Ok(keep_original(FallbackReason::DegenerateCrop));
            }
            Err(e) => return Err(e),
        };
        observer.on_stage(PipelineState::Warped, StageImage::Color(&correction.corrected));

        let refinement = refine(&correction.corrected, &correction.corrected_white)?;
        observer.on_stage(PipelineState::Refined, StageImage::Color(&refinement.image));
        let kept = refinement.rect();
        debug!(
            x = kept.x,
            y = kept.y,
            width = kept.width,
            height = kept.height,
            "Refined crop within the warped page"
        );

        let mut outcome = PageOutcome {
            final_image: refinement.image,
            original: image.clone(),
            reference: Some(correction.reference),
            fallback: None,
            angle: Some(correction.angle),
            region: Some(region),
            border_color: binarization.border_color,
            threshold: binarization.threshold,
        };

        if too_small(&outcome.final_image, image, options.min_area_ratio) {
            warn!(
                min_area_ratio = options.min_area_ratio,
                "Output too small, keeping original"
            );
            outcome.final_image = image.clone();
            outcome.fallback = Some(FallbackReason::AreaRatio);
        }

        debug!(
            angle = correction.angle,
            width = outcome.final_image.width(),
            height = outcome.final_image.height(),
            fallback = outcome.is_fallback(),
            "Page corrected"
        );
        Ok(outcome)
    }
}

/// Whether `result` covers at most `ratio` of `original` (0 disables)
fn too_small(result: &RgbImage, original: &RgbImage, ratio: f64) -> bool {
    if ratio <= 0.0 {
        return false;
    }
    let result_area = f64::from(result.width()) * f64::from(result.height());
    let original_area = f64::from(original.width()) * f64::from(original.height());
    result_area <= ratio * original_area
}

// ============================================================
// Batch
// ============================================================

/// Pipeline processing error
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Correction failed: {0}")]
    Correction(#[from] CorrectionError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Thread pool setup failed: {0}")]
    ThreadPool(String),
}

/// Progress callback for batches
pub trait ProgressCallback: Send + Sync {
    /// Called when an image starts
    fn on_job_start(&self, name: &str);
    /// Called when an image is done, whatever its status
    fn on_job_complete(&self, record: &PageRecord);
}

/// No-op progress callback (silent mode)
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_job_start(&self, _name: &str) {}
    fn on_job_complete(&self, _record: &PageRecord) {}
}

/// One image to process and where its outputs go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    /// Input path relative to the input root
    pub relative: PathBuf,
    pub output: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub reference: Option<PathBuf>,
}

/// Batch-level options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Worker threads (None = one per CPU)
    pub threads: Option<usize>,
    /// Write side-by-side thumbnails
    pub thumbnails: bool,
    /// Write the HTML report
    pub report: bool,
    /// Write the un-rotated reference crop next to each output
    pub save_reference: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            threads: None,
            thumbnails: true,
            report: true,
            save_reference: false,
        }
    }
}

impl BatchOptions {
    pub fn thread_count(&self) -> usize {
        self.threads.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }
}

/// Final status of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Corrected,
    Fallback,
    Failed,
}

/// Per-image entry of the run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub input: PathBuf,
    pub relative: PathBuf,
    pub output: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub status: PageStatus,
    pub fallback: Option<FallbackReason>,
    pub angle: Option<f64>,
    pub original_size: Option<(u32, u32)>,
    pub final_size: Option<(u32, u32)>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl PageRecord {
    fn failed(job: &BatchJob, error: &PipelineError, elapsed_ms: u64) -> Self {
        Self {
            input: job.input.clone(),
            relative: job.relative.clone(),
            output: job.output.clone(),
            thumbnail: None,
            status: PageStatus::Failed,
            fallback: None,
            angle: None,
            original_size: None,
            final_size: None,
            elapsed_ms,
            error: Some(error.to_string()),
        }
    }

    pub fn name(&self) -> String {
        self.relative.display().to_string()
    }
}

/// Parallel batch runner
pub struct BatchProcessor {
    corrector: PageCorrector,
    options: BatchOptions,
}

impl BatchProcessor {
    pub fn new(corrector: PageCorrector, options: BatchOptions) -> Self {
        Self { corrector, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process every job, isolating failures per image
    ///
    /// Records come back in job order.
    pub fn run<P: ProgressCallback>(
        &self,
        jobs: &[BatchJob],
        progress: &P,
        observer: &dyn StepObserver,
    ) -> Result<Vec<PageRecord>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.thread_count())
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        info!(
            jobs = jobs.len(),
            threads = self.options.thread_count(),
            "Starting batch"
        );

        let records = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    progress.on_job_start(&job.relative.display().to_string());
                    let start = Instant::now();
                    let record = match self.run_job(job, observer) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(input = %job.input.display(), error = %e, "Image failed");
                            PageRecord::failed(job, &e, elapsed_ms(start))
                        }
                    };
                    progress.on_job_complete(&record);
                    record
                })
                .collect()
        });
        Ok(records)
    }

    /// Correct one image and persist its outputs
    pub fn run_job(
        &self,
        job: &BatchJob,
        observer: &dyn StepObserver,
    ) -> Result<PageRecord, PipelineError> {
        let start = Instant::now();
        let original = output::load_rgb(&job.input)?;
        let outcome = self.corrector.process_image(&original, observer)?;

        output::save_image(&job.output, &outcome.final_image)?;

        let thumbnail = match (&job.thumbnail, self.options.thumbnails) {
            (Some(path), true) => {
                output::save_thumbnail(path, &outcome.original, &outcome.final_image)?;
                Some(path.clone())
            }
            _ => None,
        };

        if let (Some(path), Some(reference), true) =
            (&job.reference, &outcome.reference, self.options.save_reference)
        {
            output::save_image(path, reference)?;
        }

        observer.on_stage(PipelineState::Saved, StageImage::Color(&outcome.final_image));

        Ok(PageRecord {
            input: job.input.clone(),
            relative: job.relative.clone(),
            output: job.output.clone(),
            thumbnail,
            status: if outcome.is_fallback() {
                PageStatus::Fallback
            } else {
                PageStatus::Corrected
            },
            fallback: outcome.fallback,
            angle: outcome.angle,
            original_size: Some(outcome.original.dimensions()),
            final_size: Some(outcome.final_image.dimensions()),
            elapsed_ms: elapsed_ms(start),
            error: None,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
