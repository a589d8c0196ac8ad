//! Error types for the edgequake-pdf2img library.
//!
//! Each stage of a conversion owns a small error enum, and [`ConvertError`]
//! ties them together for the pipeline entry point:
//!
//! * [`ValidationError`]: the request itself is wrong. Detected before any
//!   file is written and reported to the client as `400`.
//! * [`RenderError`], [`ArchiveError`], [`StoreError`]: the request was fine
//!   but the server could not finish the job. Reported as `500` with the
//!   underlying message.
//!
//! [`SweepError`] never leaves the sweeper; it exists so a failed deletion
//! can be logged with its path and cause.

use crate::store::ArtifactKind;
use std::path::PathBuf;
use thiserror::Error;

/// Why an upload was rejected before any work started.
///
/// The display strings are part of the HTTP contract and match the messages
/// clients already parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The multipart body had no `pdf` file field.
    #[error("No file uploaded")]
    MissingFile,

    /// `format` was present but not `png` or `jpeg`.
    #[error("Unsupported format selected")]
    UnsupportedFormat(String),

    /// The file field carried an empty filename.
    #[error("No file selected")]
    EmptyFilename,

    /// The filename does not end in `.pdf`.
    #[error("Only PDF files are allowed.")]
    NotPdf(String),

    /// The file field was present but carried zero bytes.
    #[error("Uploaded file is empty")]
    EmptyFile,
}

/// Failures while opening or rasterising a document.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The PDFium library could not be loaded.
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Header/xref/trailer could not be parsed.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// The document is encrypted; uploads carry no password.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// PDFium failed on a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The rendered bitmap could not be encoded.
    #[error("Encoding page {page} failed: {source}")]
    Encode {
        page: usize,
        #[source]
        source: image::ImageError,
    },

    /// The page sink refused a rendered page (usually a storage failure).
    #[error("Storing page {page} failed: {source}")]
    Sink {
        page: usize,
        #[source]
        source: StoreError,
    },
}

/// Failures while building the output archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Failures of the on-disk job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown identifier, or the artifact has already been swept.
    #[error("{kind} for job '{id}' not found")]
    NotFound { kind: ArtifactKind, id: String },

    #[error("Storage I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single artifact the sweeper could not delete. Logged, never propagated.
#[derive(Debug, Error)]
#[error("Failed to remove '{path}': {source}")]
pub struct SweepError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Builder validation failure for [`crate::config::ServerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Everything [`crate::convert::Converter::convert`] can fail with.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The blocking worker panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// `true` when the client sent a bad request; everything else is a
    /// server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ConvertError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_stable() {
        assert_eq!(ValidationError::MissingFile.to_string(), "No file uploaded");
        assert_eq!(
            ValidationError::UnsupportedFormat("gif".into()).to_string(),
            "Unsupported format selected"
        );
        assert_eq!(ValidationError::EmptyFilename.to_string(), "No file selected");
        assert_eq!(
            ValidationError::NotPdf("a.txt".into()).to_string(),
            "Only PDF files are allowed."
        );
    }

    #[test]
    fn only_validation_is_client_error() {
        let v: ConvertError = ValidationError::EmptyFile.into();
        assert!(v.is_client_error());

        let r: ConvertError = RenderError::CorruptPdf {
            detail: "bad xref".into(),
        }
        .into();
        assert!(!r.is_client_error());
        assert!(r.to_string().contains("bad xref"));
    }

    #[test]
    fn not_found_display() {
        let e = StoreError::NotFound {
            kind: ArtifactKind::Archive,
            id: "abc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("archive"), "got: {msg}");
        assert!(msg.contains("abc"), "got: {msg}");
    }

    #[test]
    fn sink_error_keeps_page_number() {
        let e = RenderError::Sink {
            page: 4,
            source: StoreError::io("/tmp/x", std::io::Error::other("disk full")),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 4"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }
}
