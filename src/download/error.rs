//! Error types for the download module.
//!
//! [`DownloadError`] is per image and absorbed by the pipeline (the image is
//! skipped). [`PipelineError`] aborts the whole gallery.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Errors downloading a single image.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request failed or returned a non-success status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The connection failed while streaming the body.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL being downloaded.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The body was too short to be an image (typically an error page served
    /// with status 200).
    #[error("response from {url} too short to be an image ({bytes} bytes)")]
    EmptyBody {
        /// The URL being downloaded.
        url: String,
        /// Bytes received.
        bytes: u64,
    },

    /// File system error writing the image.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a `Network` error.
    #[must_use]
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            source,
        }
    }

    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort downloading a gallery.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An image URL has no file extension to name the file with.
    #[error(
        "image URL has no file extension: {url}\n  Suggestion: The site handler produced a non-image URL; report it as an extraction bug"
    )]
    NoExtension {
        /// Offending image URL.
        url: String,
    },

    /// The gallery directory could not be created.
    #[error("cannot create gallery directory {path}: {source}")]
    Io {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_display() {
        let err = DownloadError::EmptyBody {
            url: "https://h/a.jpg".to_string(),
            bytes: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("12 bytes"), "Expected byte count in: {msg}");
    }

    #[test]
    fn test_no_extension_has_suggestion() {
        let msg = PipelineError::NoExtension {
            url: "https://h/photo".to_string(),
        }
        .to_string();
        assert!(msg.contains("https://h/photo"));
        assert!(msg.contains("Suggestion:"));
    }
}
