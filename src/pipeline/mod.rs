//! Pipeline stages for PDF-to-images conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the rendering backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (job store) ──▶ archive
//! (check)   (pdfium)   (png/jpg)   page_N.ext      <id>.zip
//! ```
//!
//! 1. [`input`]  : validate the upload before anything touches the disk
//! 2. [`render`] : rasterise every page through a [`render::PageRenderer`]
//! 3. [`encode`] : turn each `DynamicImage` into PNG or JPEG bytes
//! 4. [`archive`]: zip the page set once every page is on disk
//!
//! [`crate::convert::Converter`] sequences the stages and owns the job store.

pub mod archive;
pub mod encode;
pub mod input;
pub mod render;
