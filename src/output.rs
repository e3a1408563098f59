//! Image discovery and persistence
//!
//! Finds input images under a directory tree, mirrors their relative layout
//! into the output tree and writes final images, reference crops and
//! side-by-side thumbnails.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::pipeline::BatchJob;

// ============================================================
// Constants
// ============================================================

/// Lower-case extensions picked up by discovery
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["tif", "tiff", "jpg", "jpeg", "png"];

/// Thumbnail width in pixels
pub const THUMBNAIL_WIDTH: u32 = 500;

/// Directory under the output root that receives thumbnails
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Suffix appended to the file stem of reference crops
const REFERENCE_SUFFIX: &str = "_reference";

// ============================================================
// Error Types
// ============================================================

/// Output and input file errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("No supported images under {0}")]
    NoImages(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Output path {path} planned for both {first} and {second}")]
    PathCollision {
        path: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, OutputError>;

// ============================================================
// Discovery
// ============================================================

/// Whether `path` has a supported image extension
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Collect supported images under `input`, sorted
///
/// `input` may be a single file. Anything under `exclude` (usually the
/// output root) is skipped.
pub fn discover_images(input: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(OutputError::InputNotFound(input.to_path_buf()));
    }

    let mut images = Vec::new();
    if input.is_file() {
        if is_supported(input) {
            images.push(input.to_path_buf());
        }
    } else {
        let exclude = exclude.and_then(|p| p.canonicalize().ok());
        walk(input, exclude.as_deref(), &mut images)?;
        images.sort();
    }

    debug!(input = %input.display(), found = images.len(), "Discovered images");
    Ok(images)
}

fn walk(dir: &Path, exclude: Option<&Path>, images: &mut Vec<PathBuf>) -> Result<()> {
    if let (Some(exclude), Ok(canonical)) = (exclude, dir.canonicalize()) {
        if canonical == exclude {
            return Ok(());
        }
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, exclude, images)?;
        } else if path.is_file() && is_supported(&path) {
            images.push(path);
        }
    }
    Ok(())
}

// ============================================================
// Layout
// ============================================================

/// Where batch outputs go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Thumbnail root (None disables thumbnails)
    pub thumbnail_root: Option<PathBuf>,
    pub save_reference: bool,
}

impl OutputLayout {
    /// Default layout with thumbnails under `<output>/thumbnails`
    pub fn new(input_root: &Path, output_root: &Path) -> Self {
        Self {
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            thumbnail_root: Some(output_root.join(THUMBNAIL_DIR)),
            save_reference: false,
        }
    }

    #[must_use]
    pub fn without_thumbnails(mut self) -> Self {
        self.thumbnail_root = None;
        self
    }

    #[must_use]
    pub fn with_reference(mut self, save: bool) -> Self {
        self.save_reference = save;
        self
    }

    /// Path of `input` relative to the input root
    ///
    /// A single-file input maps to its file name.
    pub fn relative(&self, input: &Path) -> PathBuf {
        match input.strip_prefix(&self.input_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => input
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| input.to_path_buf()),
        }
    }

    /// Build one job per input, mirroring the relative layout
    ///
    /// Fails if two jobs would write the same file, counting final images,
    /// thumbnails and reference crops alike.
    pub fn plan(&self, inputs: &[PathBuf]) -> Result<Vec<BatchJob>> {
        let jobs: Vec<BatchJob> = inputs
            .iter()
            .map(|input| {
                let relative = self.relative(input);
                let output = self.output_root.join(&relative);
                BatchJob {
                    input: input.clone(),
                    thumbnail: self
                        .thumbnail_root
                        .as_ref()
                        .map(|root| thumbnail_path(root, &relative)),
                    reference: self.save_reference.then(|| reference_path(&output)),
                    relative,
                    output,
                }
            })
            .collect();

        let mut claimed: HashMap<&Path, &Path> = HashMap::new();
        for job in &jobs {
            let targets = std::iter::once(&job.output)
                .chain(job.thumbnail.as_ref())
                .chain(job.reference.as_ref());
            for path in targets {
                if let Some(first) = claimed.insert(path.as_path(), job.input.as_path()) {
                    return Err(OutputError::PathCollision {
                        path: path.clone(),
                        first: first.to_path_buf(),
                        second: job.input.clone(),
                    });
                }
            }
        }

        Ok(jobs)
    }
}

/// `<root>/<relative>.jpg`, keeping the source extension in the name
pub fn thumbnail_path(root: &Path, relative: &Path) -> PathBuf {
    let mut name = relative
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".jpg");
    root.join(relative).with_file_name(name)
}

/// `<dir>/<stem>_reference.<ext>` next to `output`
pub fn reference_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}{}.{}", stem, REFERENCE_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, REFERENCE_SUFFIX),
    };
    output.with_file_name(name)
}

// ============================================================
// Persistence
// ============================================================

/// Decode an image and convert it to 8-bit RGB
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(OutputError::InputNotFound(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_rgb8())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write an image in the format implied by its extension
pub fn save_image(path: &Path, image: &RgbImage) -> Result<()> {
    ensure_parent(path)?;
    image.save(path)?;
    debug!(path = %path.display(), "Saved image");
    Ok(())
}

/// Original and processed side by side at equal height, scaled to
/// [`THUMBNAIL_WIDTH`]
pub fn make_thumbnail(original: &RgbImage, processed: &RgbImage) -> RgbImage {
    let height = original.height().min(processed.height()).max(1);
    let left = scale_to_height(original, height);
    let right = scale_to_height(processed, height);

    let mut side_by_side = RgbImage::new(left.width() + right.width(), height);
    imageops::replace(&mut side_by_side, &left, 0, 0);
    imageops::replace(&mut side_by_side, &right, i64::from(left.width()), 0);

    let thumb_height = (u64::from(THUMBNAIL_WIDTH) * u64::from(height)
        / u64::from(side_by_side.width().max(1)))
    .max(1) as u32;
    imageops::resize(&side_by_side, THUMBNAIL_WIDTH, thumb_height, FilterType::Triangle)
}

fn scale_to_height(image: &RgbImage, height: u32) -> RgbImage {
    if image.height() == height {
        return image.clone();
    }
    let width = (u64::from(image.width()) * u64::from(height) / u64::from(image.height().max(1)))
        .max(1) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Write the side-by-side JPEG thumbnail
pub fn save_thumbnail(path: &Path, original: &RgbImage, processed: &RgbImage) -> Result<()> {
    ensure_parent(path)?;
    make_thumbnail(original, processed).save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}
