//! # edgequake-pdf2img
//!
//! Upload a PDF, get a zip of page images back.
//!
//! A small HTTP service: every page of an uploaded document is rasterised
//! through PDFium, encoded as PNG or JPEG, and bundled into a zip archive the
//! client downloads by job identifier. Nothing is kept for long: a background
//! sweeper deletes uploads, page sets and archives once they outlive the
//! retention threshold.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /
//!  │
//!  ├─ 1. Validate  file present, format, filename, .pdf suffix, non-empty
//!  ├─ 2. Store     uploads/<id>.pdf
//!  ├─ 3. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 4. Encode    PNG or JPEG → outputs/<id>/page_N.ext
//!  ├─ 5. Archive   zips/<id>.zip
//!  └─ 6. Respond   {"download_link": "/download/<id>"}
//!
//! Sweeper ── every interval ── delete anything older than retention
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{router, AppState, PdfiumRenderer, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().data_dir("/tmp/pdf2img").build()?;
//!     let renderer = Arc::new(PdfiumRenderer::bind(&config)?);
//!     let state = AppState::new(config, renderer)?;
//!
//!     let sweeper = state.sweeper().spawn();
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router(state)).await?;
//!     sweeper.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod sweep;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutputFormat, ServerConfig, ServerConfigBuilder};
pub use convert::{ConvertedJob, Converter};
pub use error::{
    ArchiveError, ConfigError, ConvertError, RenderError, StoreError, SweepError, ValidationError,
};
pub use job::{InFlightGuard, InFlightJobs, JobId};
pub use pipeline::input::{UploadRequest, UploadedFile};
pub use pipeline::render::{PageRenderer, PageSink, PdfiumRenderer, RenderedPage};
pub use server::{router, AppState};
pub use store::{ArtifactKind, JobStore, StoredArtifact};
pub use sweep::{SweepReport, Sweeper, SweeperHandle};
