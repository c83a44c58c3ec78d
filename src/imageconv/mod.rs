//! Batch image format conversion over a directory tree.
//!
//! [`convert_tree`] walks a directory, picks every file whose extension
//! matches the source format, and writes a converted sibling with the target
//! extension next to it. Originals are never modified.
//!
//! # Example
//!
//! ```no_run
//! use pdownload_core::imageconv::{Format, convert_tree};
//! use std::path::Path;
//!
//! let report = convert_tree(Path::new("./photos"), Format::Jpeg, Format::Png)?;
//! println!("{} converted, {} failed", report.converted.len(), report.failed.len());
//! # Ok::<(), pdownload_core::imageconv::ConvertError>(())
//! ```

mod error;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, ImageReader};
use tracing::{debug, info, instrument, warn};

pub use error::ConvertError;

/// Image formats the converter reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Portable Network Graphics (`.png`).
    Png,
    /// JPEG (`.jpg`, `.jpeg`).
    Jpeg,
    /// Graphics Interchange Format (`.gif`).
    Gif,
}

impl Format {
    /// Extension written for converted files, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
        }
    }

    /// Returns true if `ext` (without dot, any case) names this format.
    #[must_use]
    pub fn matches_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            Self::Png => ext == "png",
            Self::Jpeg => ext == "jpg" || ext == "jpeg",
            Self::Gif => ext == "gif",
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        match trimmed.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            _ => Err(ConvertError::UnsupportedFormat {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file on disk with its lowercased extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    path: PathBuf,
    extension: String,
}

impl ImageFile {
    /// Wraps `path`, recording its extension (empty when there is none).
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Self { path, extension }
    }

    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path the converted file is written to: same stem, `to`'s extension.
    #[must_use]
    pub fn converted_path(&self, to: Format) -> PathBuf {
        self.path.with_extension(to.extension())
    }

    /// Decodes the file and writes it as `to` next to the original.
    ///
    /// JPEG output drops the alpha channel; GIF output is encoded from RGBA.
    /// An existing file at the destination is replaced.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::Io`] if the file cannot be opened
    /// - [`ConvertError::Image`] if decoding or encoding fails
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn convert(&self, to: Format) -> Result<PathBuf, ConvertError> {
        let decoded = ImageReader::open(&self.path)
            .map_err(|e| ConvertError::io(&self.path, e))?
            .with_guessed_format()
            .map_err(|e| ConvertError::io(&self.path, e))?
            .decode()
            .map_err(|e| ConvertError::image(&self.path, e))?;

        let encodable = match to {
            Format::Jpeg => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            Format::Gif => DynamicImage::ImageRgba8(decoded.to_rgba8()),
            Format::Png => decoded,
        };

        let destination = self.converted_path(to);
        encodable
            .save_with_format(&destination, to.image_format())
            .map_err(|e| ConvertError::image(&destination, e))?;

        debug!(to = %destination.display(), "converted");
        Ok(destination)
    }
}

/// Outcome of [`convert_tree`].
#[derive(Debug, Default)]
pub struct ConversionReport {
    /// Paths written, in walk order.
    pub converted: Vec<PathBuf>,
    /// Source files that could not be converted.
    pub failed: Vec<(PathBuf, ConvertError)>,
}

impl ConversionReport {
    /// True when no file failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lists every regular file under `dir`, recursively, sorted by path.
///
/// # Errors
///
/// - [`ConvertError::DirectoryNotFound`] if `dir` is missing or not a directory
/// - [`ConvertError::Io`] if a directory cannot be read
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    if !dir.is_dir() {
        return Err(ConvertError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ConvertError> {
    let entries = fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(dir, e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_files_recursive(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }

    Ok(())
}

/// Keeps the files whose extension names `format`.
#[must_use]
pub fn filter_by_extension(files: Vec<ImageFile>, format: Format) -> Vec<ImageFile> {
    files
        .into_iter()
        .filter(|file| format.matches_extension(file.extension()))
        .collect()
}

/// Converts every `from` image under `dir` to `to`.
///
/// A file that fails to convert is recorded in the report and the walk goes
/// on.
///
/// # Errors
///
/// Returns an error only if the tree itself cannot be walked (see
/// [`collect_files`]).
#[instrument(skip_all, fields(dir = %dir.display(), %from, %to))]
pub fn convert_tree(dir: &Path, from: Format, to: Format) -> Result<ConversionReport, ConvertError> {
    let files = collect_files(dir)?
        .into_iter()
        .map(ImageFile::from_path)
        .collect();
    let candidates = filter_by_extension(files, from);
    info!(candidates = candidates.len(), "converting images");

    let mut report = ConversionReport::default();
    for file in candidates {
        match file.convert(to) {
            Ok(destination) => report.converted.push(destination),
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "conversion failed");
                report.failed.push((file.path, e));
            }
        }
    }

    info!(
        converted = report.converted.len(),
        failed = report.failed.len(),
        "conversion finished"
    );
    Ok(report)
}
