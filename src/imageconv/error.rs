//! Error types for image conversion.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while discovering or converting images.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The root path does not exist or is not a directory.
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound {
        /// The rejected path.
        path: PathBuf,
    },

    /// A format name other than png, jpg, jpeg, or gif.
    #[error("unsupported format '{value}': expected png, jpg, jpeg, or gif")]
    UnsupportedFormat {
        /// The rejected value.
        value: String,
    },

    /// Filesystem failure.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Decode or encode failure.
    #[error("image error at {}: {source}", path.display())]
    Image {
        /// Image being processed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: image::ImageError,
    },
}

impl ConvertError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an image error with path context.
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_display_names_path() {
        let error = ConvertError::DirectoryNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert!(error.to_string().contains("/no/such/dir"));

        let error = ConvertError::UnsupportedFormat {
            value: "bmp".to_string(),
        };
        assert!(error.to_string().contains("'bmp'"));

        let error = ConvertError::io("/tmp/a.png", std::io::Error::other("disk full"));
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.png"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }
}
