//! Run reports
//!
//! `run.json` records every page outcome plus run totals; `report.html`
//! shows each thumbnail with its relative name for a quick visual check.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::pipeline::{PageRecord, PageStatus};

/// Metadata file name under the output root
pub const RUN_FILE: &str = "run.json";

/// HTML report file name under the output root
pub const REPORT_FILE: &str = "report.html";

/// Report errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Page counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: usize,
    pub corrected: usize,
    pub fallback: usize,
    pub failed: usize,
}

impl RunTotals {
    pub fn from_records(records: &[PageRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Default::default()
            },
            |mut totals, record| {
                match record.status {
                    PageStatus::Corrected => totals.corrected += 1,
                    PageStatus::Fallback => totals.fallback += 1,
                    PageStatus::Failed => totals.failed += 1,
                }
                totals
            },
        )
    }
}

/// Contents of `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Effective settings of the run
    pub settings: Config,
    pub totals: RunTotals,
    pub elapsed_secs: f64,
    pub pages: Vec<PageRecord>,
}

impl RunMetadata {
    /// Close a run that began at `started_at`
    pub fn new(
        started_at: DateTime<Local>,
        input: &Path,
        output: &Path,
        settings: Config,
        pages: Vec<PageRecord>,
    ) -> Self {
        let finished_at = Local::now();
        let elapsed_secs = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            settings,
            totals: RunTotals::from_records(&pages),
            elapsed_secs,
            pages,
        }
    }

    /// Write pretty-printed JSON to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved run metadata");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ============================================================
// HTML
// ============================================================

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Processed thumbnails</title>
<style>
body { font-family: Arial, sans-serif; }
.thumbnail { margin: 10px; display: inline-block; vertical-align: top; }
.thumbnail img { width: 400px; height: auto; }
.thumbnail p { text-align: center; }
.fallback p { color: #a06000; }
.failed p { color: #b00000; }
</style>
</head>
<body>
"#;

/// Render the thumbnail report
///
/// Thumbnails are inlined as base64 so the report stays valid when moved.
/// Pages without a readable thumbnail are listed by name only.
pub fn render_html(metadata: &RunMetadata) -> String {
    let totals = metadata.totals;
    let mut html = String::from(HTML_HEAD);
    let _ = writeln!(html, "<h1>Processed images</h1>");
    let _ = writeln!(
        html,
        "<p>{} images: {} corrected, {} kept as-is, {} failed. Started {}.</p>",
        totals.total,
        totals.corrected,
        totals.fallback,
        totals.failed,
        metadata.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    html.push_str("<div>\n");

    for page in &metadata.pages {
        let class = match page.status {
            PageStatus::Corrected => "thumbnail",
            PageStatus::Fallback => "thumbnail fallback",
            PageStatus::Failed => "thumbnail failed",
        };
        let name = escape_html(&page.name());
        let _ = writeln!(html, "<div class=\"{}\">", class);
        if let Some(src) = page.thumbnail.as_deref().and_then(inline_jpeg) {
            let _ = writeln!(html, "<img src=\"{}\" alt=\"{}\">", src, name);
        }
        let _ = writeln!(html, "<p>{}</p>", name);
        html.push_str("</div>\n");
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Write the HTML report to `path`
pub fn write_html(path: &Path, metadata: &RunMetadata) -> Result<()> {
    std::fs::write(path, render_html(metadata))?;
    debug!(path = %path.display(), "Saved HTML report");
    Ok(())
}

fn inline_jpeg(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Thumbnail unreadable");
            None
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
