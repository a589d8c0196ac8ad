//! Upload validation: decide whether a request is worth converting.
//!
//! Runs entirely in memory. Nothing is written to the job store until
//! [`validate`] has accepted the request, so a rejected upload leaves no
//! trace on disk.

use crate::config::OutputFormat;
use crate::error::ValidationError;
use tracing::debug;

/// The file part of a multipart upload.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Client-supplied filename; may be empty when the browser sent no file.
    pub filename: String,
    pub content: Vec<u8>,
}

/// Raw upload as received by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// `None` when the `pdf` field was missing altogether.
    pub file: Option<UploadedFile>,
    /// `None` when the `format` field was missing; defaults to PNG.
    pub format: Option<String>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file: Some(UploadedFile {
                filename: filename.into(),
                content: content.into(),
            }),
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// An upload that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub filename: String,
    pub content: Vec<u8>,
    pub format: OutputFormat,
}

/// Check an upload, failing on the first problem found.
///
/// Checks run in a fixed order: file present, format supported, filename
/// present, `.pdf` suffix (case-insensitive), non-empty content.
pub fn validate(request: UploadRequest) -> Result<ValidatedUpload, ValidationError> {
    let file = request.file.ok_or(ValidationError::MissingFile)?;

    let format = match request.format.as_deref() {
        None => OutputFormat::default(),
        Some(raw) => OutputFormat::parse(raw)?,
    };

    if file.filename.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if !has_pdf_extension(&file.filename) {
        return Err(ValidationError::NotPdf(file.filename));
    }

    if file.content.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    debug!(
        "Accepted upload '{}' ({} bytes, {})",
        file.filename,
        file.content.len(),
        format
    );

    Ok(ValidatedUpload {
        filename: file.filename,
        content: file.content,
        format,
    })
}

fn has_pdf_extension(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf() -> Vec<u8> {
        b"%PDF-1.4\n".to_vec()
    }

    #[test]
    fn accepts_pdf_with_default_format() {
        let ok = validate(UploadRequest::new("report.pdf", pdf())).unwrap();
        assert_eq!(ok.format, OutputFormat::Png);
        assert_eq!(ok.filename, "report.pdf");
    }

    #[test]
    fn accepts_jpeg_and_uppercase_suffix() {
        let ok = validate(UploadRequest::new("SCAN.PDF", pdf()).with_format("jpeg")).unwrap();
        assert_eq!(ok.format, OutputFormat::Jpeg);
    }

    #[test]
    fn missing_file_wins_over_everything() {
        let req = UploadRequest {
            file: None,
            format: Some("gif".into()),
        };
        assert_eq!(validate(req).unwrap_err(), ValidationError::MissingFile);
    }

    #[test]
    fn rejects_unknown_format_before_filename() {
        let err = validate(UploadRequest::new("", pdf()).with_format("tiff")).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("tiff".into()));
    }

    #[test]
    fn rejects_empty_filename() {
        let err = validate(UploadRequest::new("", pdf())).unwrap_err();
        assert_eq!(err, ValidationError::EmptyFilename);
    }

    #[test]
    fn rejects_non_pdf_suffix() {
        for name in ["notes.txt", "pdf", "archive.pdf.zip", "x.pd"] {
            let err = validate(UploadRequest::new(name, pdf())).unwrap_err();
            assert!(matches!(err, ValidationError::NotPdf(_)), "{name}: {err:?}");
        }
    }

    #[test]
    fn rejects_zero_byte_pdf() {
        let err = validate(UploadRequest::new("x.pdf", Vec::new())).unwrap_err();
        assert_eq!(err, ValidationError::EmptyFile);
    }
}
