//! Conversion entry point: one upload in, one downloadable archive out.
//!
//! ```text
//! validate ─▶ mint id ─▶ store upload ─▶ render pages ─▶ zip ─▶ publish
//!  (async)                └──────────── spawn_blocking ────────────┘
//! ```
//!
//! Validation happens before any disk access. Everything after runs on the
//! blocking pool because PDFium and the filesystem calls are synchronous.
//! There is a single attempt per request: on failure the error is returned
//! and whatever was already written stays on disk until the sweeper reaps
//! it. The failed job's identifier is never handed out, so nothing can
//! reach those leftovers in the meantime.

use crate::error::ConvertError;
use crate::job::{InFlightJobs, JobId};
use crate::pipeline::archive;
use crate::pipeline::input::{self, UploadRequest, ValidatedUpload};
use crate::pipeline::render::PageRenderer;
use crate::store::JobStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedJob {
    pub id: JobId,
    pub page_count: usize,
    pub duration_ms: u64,
}

impl ConvertedJob {
    /// Relative URL the archive can be fetched from.
    pub fn download_link(&self) -> String {
        format!("/download/{}", self.id)
    }
}

/// Runs conversions against a job store with a given renderer.
#[derive(Clone)]
pub struct Converter {
    store: JobStore,
    renderer: Arc<dyn PageRenderer>,
    in_flight: InFlightJobs,
}

impl Converter {
    pub fn new(store: JobStore, renderer: Arc<dyn PageRenderer>, in_flight: InFlightJobs) -> Self {
        Self {
            store,
            renderer,
            in_flight,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validate and convert an upload.
    ///
    /// # Errors
    /// - [`ConvertError::Validation`]: nothing was written.
    /// - [`ConvertError::Render`] / [`ConvertError::Archive`] /
    ///   [`ConvertError::Storage`]: the job was aborted part-way.
    pub async fn convert(&self, request: UploadRequest) -> Result<ConvertedJob, ConvertError> {
        let upload = input::validate(request)?;

        // The guard moves into the blocking task: if the client disconnects
        // and this future is dropped, the job stays registered until the
        // work it protects has actually stopped.
        let guard = self.in_flight.register(JobId::new());
        let id = guard.id();
        info!(
            job_id = %id,
            filename = %upload.filename,
            format = %upload.format,
            bytes = upload.content.len(),
            "Starting conversion"
        );

        let store = self.store.clone();
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            convert_blocking(&store, renderer.as_ref(), id, upload)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {e}")))?
    }
}

/// Blocking body of a conversion for an already-minted identifier.
pub fn convert_blocking(
    store: &JobStore,
    renderer: &dyn PageRenderer,
    id: JobId,
    upload: ValidatedUpload,
) -> Result<ConvertedJob, ConvertError> {
    let total_start = Instant::now();
    let format = upload.format;

    // ── Step 1: Persist upload ───────────────────────────────────────────
    let pdf_path = store.put_upload(id, &upload.content)?;
    drop(upload);

    // ── Step 2: Render pages ─────────────────────────────────────────────
    let render_start = Instant::now();
    let pages_dir = store.create_page_set(id)?;
    let page_count = renderer.render_document(&pdf_path, format, &mut |page| {
        let path = store.put_page(id, page.number, format, &page.bytes)?;
        debug!("Wrote {} ({}x{})", path.display(), page.width, page.height);
        Ok(())
    })?;
    info!(
        job_id = %id,
        "Rendered {} pages in {}ms",
        page_count,
        render_start.elapsed().as_millis()
    );

    // ── Step 3: Archive ──────────────────────────────────────────────────
    let partial = store.partial_archive_path(id);
    let entries = archive::build_archive(&pages_dir, &partial)?;
    let published = store.publish_archive(id, &partial)?;
    debug!("Published {} ({} entries)", published.display(), entries);

    let duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        job_id = %id,
        pages = page_count,
        "Conversion complete in {}ms",
        duration_ms
    );

    Ok(ConvertedJob {
        id,
        page_count,
        duration_ms,
    })
}
