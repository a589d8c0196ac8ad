//! Configuration types for the conversion service.
//!
//! Every knob lives in [`ServerConfig`], built via [`ServerConfigBuilder`].
//! The binary maps CLI flags and environment variables onto the builder;
//! tests build configs directly with a temporary data directory.

use crate::error::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Linear magnification applied to every page (6× per axis, 36× the pixels).
pub const DEFAULT_RENDER_SCALE: f32 = 6.0;

/// Artifacts older than this are removed by the sweeper.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(120);

/// Pause between two sweep cycles.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Largest request body accepted by the upload endpoint.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Runtime configuration for the service.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::builder()
///     .data_dir("/var/lib/pdf2img")
///     .retention(Duration::from_secs(600))
///     .build()
///     .unwrap();
/// assert_eq!(config.uploads_dir(), std::path::Path::new("/var/lib/pdf2img/uploads"));
/// ```
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    /// Parent of the `uploads/`, `outputs/` and `zips/` directories. Default: `.`.
    pub data_dir: PathBuf,

    /// Maximum age of any stored artifact. Default: 120 s.
    ///
    /// Keep this comfortably above the slowest expected conversion. Jobs that
    /// are still being written are never swept regardless of age.
    pub retention: Duration,

    /// Sleep between sweep cycles. Default: 120 s.
    pub sweep_interval: Duration,

    /// Request body limit for uploads, in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// Page magnification factor. Range: 0.25–10. Default: 6.0.
    pub render_scale: f32,

    /// Explicit PDFium library to bind. `None` resolves it through
    /// `pdfium-auto` (env var, cache, then download).
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            render_scale: DEFAULT_RENDER_SCALE,
            pdfium_library: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("data_dir", &self.data_dir)
            .field("retention_secs", &self.retention.as_secs())
            .field("sweep_interval_secs", &self.sweep_interval.as_secs())
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("render_scale", &self.render_scale)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }

    pub fn zips_dir(&self) -> PathBuf {
        self.data_dir.join("zips")
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let c = &self.config;
        if !(0.25..=10.0).contains(&c.render_scale) {
            return Err(ConfigError(format!(
                "render scale must be 0.25–10, got {}",
                c.render_scale
            )));
        }
        if c.sweep_interval.is_zero() {
            return Err(ConfigError("sweep interval must be > 0".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConfigError("upload limit must be > 0".into()));
        }
        if c.data_dir.as_os_str().is_empty() {
            return Err(ConfigError("data directory must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Raster format of the rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless; the default when the client does not pick one.
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    /// Parse the `format` form field. Only the exact strings `png` and `jpeg`
    /// are accepted.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "png" => Ok(OutputFormat::Png),
            "jpeg" => Ok(OutputFormat::Jpeg),
            other => Err(ValidationError::UnsupportedFormat(other.to_string())),
        }
    }

    /// File extension used for page files (`jpg`, not `jpeg`).
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Png => f.write_str("png"),
            OutputFormat::Jpeg => f.write_str("jpeg"),
        }
    }
}
