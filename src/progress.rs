//! Progress tracking module for batch processing.
//!
//! Counts page outcomes while a batch runs and drives the terminal
//! progress bar.

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::cli::create_progress_bar;
use crate::pipeline::{PageRecord, PageStatus, ProgressCallback};

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// No output
    Quiet,
    /// Progress bar and summary
    #[default]
    Normal,
    /// Also one line per failed or fallback page
    Verbose,
    /// Also the page currently being processed
    VeryVerbose,
}

impl OutputMode {
    /// Create OutputMode from verbosity level
    pub fn from_verbosity(level: u8) -> Self {
        match level {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// `--quiet` wins over any `-v`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            OutputMode::Quiet
        } else {
            Self::from_verbosity(verbose)
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }
}

/// Outcome counters for one batch
#[derive(Debug)]
pub struct ProgressTracker {
    pub total_pages: usize,
    corrected: AtomicUsize,
    fallback: AtomicUsize,
    failed: AtomicUsize,
    start_time: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ProgressTracker {
    pub fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            corrected: AtomicUsize::new(0),
            fallback: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count one finished page
    pub fn record(&self, status: PageStatus) {
        let counter = match status {
            PageStatus::Corrected => &self.corrected,
            PageStatus::Fallback => &self.fallback,
            PageStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn corrected(&self) -> usize {
        self.corrected.load(Ordering::Relaxed)
    }

    pub fn fallback(&self) -> usize {
        self.fallback.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Pages finished so far
    pub fn done(&self) -> usize {
        self.corrected() + self.fallback() + self.failed()
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Print final summary
    pub fn print_summary(total: usize, corrected: usize, fallback: usize, failed: usize) {
        println!();
        println!("{}", "=".repeat(80));
        println!("Processing Summary");
        println!("{}", "=".repeat(80));
        println!("  Total images: {}", total);
        println!("  Corrected:    {}", corrected);
        println!("  Kept as-is:   {}", fallback);
        println!("  Errors:       {}", failed);
        println!("{}", "=".repeat(80));
        println!();
    }
}

/// Progress bar plus counters, handed to the batch runner
pub struct BatchProgress {
    bar: Option<ProgressBar>,
    tracker: ProgressTracker,
    mode: OutputMode,
}

impl BatchProgress {
    pub fn new(total_pages: usize, mode: OutputMode) -> Self {
        let bar = mode
            .should_show(OutputMode::Normal)
            .then(|| create_progress_bar(total_pages as u64));
        Self {
            bar,
            tracker: ProgressTracker::new(total_pages),
            mode,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Stop the bar, leaving the final state on screen
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message("done");
        }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }
}

impl ProgressCallback for BatchProgress {
    fn on_job_start(&self, name: &str) {
        if self.mode.should_show(OutputMode::VeryVerbose) {
            if let Some(bar) = &self.bar {
                bar.set_message(name.to_string());
            }
        }
    }

    fn on_job_complete(&self, record: &PageRecord) {
        self.tracker.record(record.status);
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }

        match record.status {
            PageStatus::Failed if self.mode.should_show(OutputMode::Normal) => {
                self.println(format!(
                    "  failed: {} ({})",
                    record.name(),
                    record.error.as_deref().unwrap_or("unknown error")
                ));
            }
            PageStatus::Fallback if self.mode.should_show(OutputMode::Verbose) => {
                let reason = record.fallback.map(|r| r.name()).unwrap_or("unknown");
                self.println(format!("  kept original: {} ({})", record.name(), reason));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FallbackReason;
    use std::path::PathBuf;

    fn record(status: PageStatus) -> PageRecord {
        PageRecord {
            input: PathBuf::from("in/a.tif"),
            relative: PathBuf::from("a.tif"),
            output: PathBuf::from("out/a.tif"),
            thumbnail: None,
            status,
            fallback: (status == PageStatus::Fallback).then_some(FallbackReason::RegionMissing),
            angle: None,
            original_size: None,
            final_size: None,
            elapsed_ms: 0,
            error: (status == PageStatus::Failed).then(|| "broken".to_string()),
        }
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ProgressTracker::new(4);
        tracker.record(PageStatus::Corrected);
        tracker.record(PageStatus::Corrected);
        tracker.record(PageStatus::Fallback);
        tracker.record(PageStatus::Failed);
        assert_eq!(tracker.corrected(), 2);
        assert_eq!(tracker.fallback(), 1);
        assert_eq!(tracker.failed(), 1);
        assert_eq!(tracker.done(), tracker.total_pages);
    }

    #[test]
    fn test_batch_progress_quiet_has_no_bar() {
        let progress = BatchProgress::new(3, OutputMode::Quiet);
        assert!(progress.bar.is_none());
        for status in [PageStatus::Corrected, PageStatus::Fallback, PageStatus::Failed] {
            progress.on_job_start("a.tif");
            progress.on_job_complete(&record(status));
        }
        assert_eq!(progress.tracker().done(), 3);
        progress.finish();
    }

    #[test]
    fn test_batch_progress_advances_bar() {
        let progress = BatchProgress::new(2, OutputMode::Normal);
        progress.on_job_complete(&record(PageStatus::Corrected));
        assert_eq!(progress.bar.as_ref().unwrap().position(), 1);
        progress.finish();
    }

    #[test]
    fn test_elapsed_secs() {
        let tracker = ProgressTracker::default();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(tracker.elapsed_secs() >= 0.01);
    }

    #[test]
    fn test_output_mode_from_verbosity() {
        assert_eq!(OutputMode::from_verbosity(0), OutputMode::Normal);
        assert_eq!(OutputMode::from_verbosity(1), OutputMode::Verbose);
        assert_eq!(OutputMode::from_verbosity(2), OutputMode::VeryVerbose);
        assert_eq!(OutputMode::from_verbosity(10), OutputMode::VeryVerbose);
        assert_eq!(OutputMode::from_flags(2, true), OutputMode::Quiet);
    }

    #[test]
    fn test_output_mode_quiet() {
        let mode = OutputMode::Quiet;
        assert!(!mode.should_show(OutputMode::Quiet));
        assert!(!mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
    }

    #[test]
    fn test_output_mode_normal() {
        let mode = OutputMode::Normal;
        assert!(mode.should_show(OutputMode::Quiet));
        assert!(mode.should_show(OutputMode::Normal));
        assert!(!mode.should_show(OutputMode::Verbose));
        assert!(!mode.should_show(OutputMode::VeryVerbose));
    }

    #[test]
    fn test_output_mode_very_verbose() {
        let mode = OutputMode::VeryVerbose;
        assert!(mode.should_show(OutputMode::Verbose));
        assert!(mode.should_show(OutputMode::VeryVerbose));
    }
}
