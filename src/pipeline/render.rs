//! PDF rasterisation: render every page of a document and hand each encoded
//! image to a sink as soon as it is ready.
//!
//! ## Why a sink instead of a `Vec`?
//!
//! At 6× magnification an A4 page is roughly 3 600 × 5 000 px, i.e. ~70 MB of
//! RGBA before encoding. Passing each page to the caller (which writes it to
//! the job store) keeps at most one bitmap alive, whatever the page count.
//!
//! ## Why a trait?
//!
//! [`PageRenderer`] is the seam between the pipeline and the native PDFium
//! library. The HTTP surface and the conversion pipeline are tested against
//! lightweight renderers that need no shared library at all.
//!
//! All methods are blocking; call them from `spawn_blocking`.

use crate::config::{OutputFormat, ServerConfig};
use crate::error::{RenderError, StoreError};
use crate::pipeline::encode;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// One encoded page, numbered from 1.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub number: usize,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Receives pages in page order. Returning an error aborts the render.
pub type PageSink<'a> = dyn FnMut(RenderedPage) -> Result<(), StoreError> + 'a;

/// Turns a PDF on disk into a sequence of encoded page images.
pub trait PageRenderer: Send + Sync {
    /// Render every page of `pdf_path` in order, passing each one to `sink`.
    ///
    /// Returns the number of pages rendered. Any document handle must be
    /// released before returning, on success and on error alike.
    fn render_document(
        &self,
        pdf_path: &Path,
        format: OutputFormat,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, RenderError>;
}

/// [`PageRenderer`] backed by the PDFium library.
///
/// PDFium is bound once at construction. Documents are rendered one at a
/// time: PDFium is not re-entrant, so concurrent jobs queue on an internal
/// lock rather than racing inside the library. Sharing the binding across
/// threads needs pdfium-render's `sync` feature.
pub struct PdfiumRenderer {
    pdfium: Mutex<Pdfium>,
    scale: f32,
    library: PathBuf,
}

impl PdfiumRenderer {
    /// Bind PDFium according to `config`, downloading it on first use when no
    /// library is configured or cached.
    pub fn bind(config: &ServerConfig) -> Result<Self, RenderError> {
        let library = match &config.pdfium_library {
            Some(path) => path.clone(),
            None => pdfium_auto::ensure_pdfium_library()
                .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?,
        };
        let pdfium = pdfium_auto::bind_pdfium_from_path(&library)
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;

        info!("PDFium bound from {}", library.display());
        Ok(Self {
            pdfium: Mutex::new(pdfium),
            scale: config.render_scale,
            library,
        })
    }

    /// Path of the bound shared library.
    pub fn library(&self) -> &Path {
        &self.library
    }

    fn engine(&self) -> MutexGuard<'_, Pdfium> {
        self.pdfium.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_document(
        &self,
        pdf_path: &Path,
        format: OutputFormat,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, RenderError> {
        let pdfium = self.engine();

        // Dropped at the end of this scope, which closes the document in
        // PDFium on every return path.
        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let detail = format!("{e:?}");
            if detail.contains("Password") || detail.contains("password") {
                RenderError::PasswordRequired
            } else {
                RenderError::CorruptPdf { detail }
            }
        })?;

        let pages = document.pages();
        info!(
            "PDF loaded: {} pages, rendering at {}x as {}",
            pages.len(),
            self.scale,
            format
        );

        let render_config = PdfRenderConfig::new().scale_page_by_factor(self.scale);

        let mut rendered = 0;
        for (idx, page) in pages.iter().enumerate() {
            let number = idx + 1;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                RenderError::RasterisationFailed {
                    page: number,
                    detail: format!("{e:?}"),
                }
            })?;

            let image = bitmap.as_image();
            let bytes = encode::encode_page(&image, format)
                .map_err(|source| RenderError::Encode { page: number, source })?;

            debug!(
                "Rendered page {} → {}x{} px",
                number,
                image.width(),
                image.height()
            );

            sink(RenderedPage {
                number,
                width: image.width(),
                height: image.height(),
                bytes,
            })
            .map_err(|source| RenderError::Sink { page: number, source })?;
            rendered += 1;
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits `pages` blank pages, refusing anything that lacks the PDF magic.
    struct BlankRenderer {
        pages: usize,
    }

    impl PageRenderer for BlankRenderer {
        fn render_document(
            &self,
            pdf_path: &Path,
            format: OutputFormat,
            sink: &mut PageSink<'_>,
        ) -> Result<usize, RenderError> {
            let bytes = std::fs::read(pdf_path).map_err(|e| RenderError::CorruptPdf {
                detail: e.to_string(),
            })?;
            if !bytes.starts_with(b"%PDF") {
                return Err(RenderError::CorruptPdf {
                    detail: "missing %PDF header".into(),
                });
            }
            for number in 1..=self.pages {
                let img = image::DynamicImage::new_rgba8(4, 4);
                let bytes = encode::encode_page(&img, format)
                    .map_err(|source| RenderError::Encode { page: number, source })?;
                sink(RenderedPage {
                    number,
                    width: 4,
                    height: 4,
                    bytes,
                })
                .map_err(|source| RenderError::Sink { page: number, source })?;
            }
            Ok(self.pages)
        }
    }

    #[test]
    fn pages_arrive_in_order() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"%PDF-1.7").unwrap();

        let mut seen = Vec::new();
        let count = BlankRenderer { pages: 3 }
            .render_document(tmp.path(), OutputFormat::Png, &mut |page| {
                seen.push(page.number);
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn sink_failure_aborts_with_page_number() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"%PDF-1.7").unwrap();

        let err = BlankRenderer { pages: 5 }
            .render_document(tmp.path(), OutputFormat::Jpeg, &mut |page| {
                if page.number == 2 {
                    Err(StoreError::io("/full", std::io::Error::other("no space")))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert!(matches!(err, RenderError::Sink { page: 2, .. }), "got: {err:?}");
    }

    #[test]
    fn pdfium_renderer_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfiumRenderer>();
    }

    #[test]
    fn renderer_is_object_safe() {
        let r: Box<dyn PageRenderer> = Box::new(BlankRenderer { pages: 1 });
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"garbage").unwrap();
        let err = r
            .render_document(tmp.path(), OutputFormat::Png, &mut |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, RenderError::CorruptPdf { .. }));
    }
}
