//! # pdfium-auto
//!
//! Locate, download and bind the [PDFium](https://pdfium.googlesource.com/pdfium/)
//! shared library so that `pdfium-render` users do not have to install
//! libpdfium by hand or fiddle with `LD_LIBRARY_PATH`.
//!
//! ## Resolution order
//!
//! 1. An explicit path passed to [`bind_pdfium_from_path`].
//! 2. `PDFIUM_LIB_PATH`, when it points to an existing file.
//! 3. The per-version cache directory (see [`pdfium_cache_dir`]).
//! 4. Download the platform archive from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries),
//!    extract the library into the cache directory, then bind it.
//!
//! Resolution happens at most once per process; later calls reuse the path.
//!
//! ## Platform support
//!
//! | OS      | Arch    | Library               |
//! |---------|---------|-----------------------|
//! | macOS   | arm64   | `libpdfium.dylib`     |
//! | macOS   | x86_64  | `libpdfium.dylib`     |
//! | Linux   | x86_64  | `libpdfium.so`        |
//! | Linux   | aarch64 | `libpdfium.so`        |
//! | Windows | x86_64  | `pdfium.dll`          |
//! | Windows | aarch64 | `pdfium.dll`          |
//!
//! ## Environment variable overrides
//!
//! - `PDFIUM_LIB_PATH`: path to an existing pdfium library; skips download.
//! - `PDFIUM_AUTO_CACHE_DIR`: override the default cache directory.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Upper bound on the downloaded archive. The real archives are ~30 MB.
const MAX_ARCHIVE_BYTES: u64 = 128 * 1024 * 1024;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while locating or binding PDFium.
#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    /// The current OS/architecture combination has no published binary.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlatformInfo {
    /// Asset filename in the GitHub release.
    archive_name: &'static str,
    /// Path of the library inside the archive.
    lib_path_in_archive: &'static str,
    /// Filename written to the cache directory.
    lib_name: &'static str,
}

const fn platform(
    archive_name: &'static str,
    lib_name: &'static str,
    in_archive: &'static str,
) -> PlatformInfo {
    PlatformInfo {
        archive_name,
        lib_path_in_archive: in_archive,
        lib_name,
    }
}

fn platform_for(os: &str, arch: &str) -> Result<PlatformInfo, PdfiumAutoError> {
    let info = match (os, arch) {
        ("macos", "aarch64") => platform("pdfium-mac-arm64.tgz", "libpdfium.dylib", "lib/libpdfium.dylib"),
        ("macos", "x86_64") => platform("pdfium-mac-x64.tgz", "libpdfium.dylib", "lib/libpdfium.dylib"),
        ("linux", "x86_64") => platform("pdfium-linux-x64.tgz", "libpdfium.so", "lib/libpdfium.so"),
        ("linux", "aarch64") => platform("pdfium-linux-arm64.tgz", "libpdfium.so", "lib/libpdfium.so"),
        ("windows", "x86_64") => platform("pdfium-win-x64.tgz", "pdfium.dll", "bin/pdfium.dll"),
        ("windows", "aarch64") => platform("pdfium-win-arm64.tgz", "pdfium.dll", "bin/pdfium.dll"),
        (os, arch) => {
            return Err(PdfiumAutoError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(info)
}

fn detect_platform() -> Result<PlatformInfo, PdfiumAutoError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

// ── Cache directory ──────────────────────────────────────────────────────────

/// Per-version cache directory for the PDFium library.
///
/// Defaults to `{cache_dir}/pdf2img/pdfium-{VERSION}/`, e.g.
/// `~/.cache/pdf2img/pdfium-7690/` on Linux. Override with
/// `PDFIUM_AUTO_CACHE_DIR`.
pub fn pdfium_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("PDFIUM_AUTO_CACHE_DIR") {
        return PathBuf::from(override_dir).join(format!("pdfium-{PDFIUM_VERSION}"));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("pdf2img").join(format!("pdfium-{PDFIUM_VERSION}"))
}

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the on-disk path to a usable PDFium library without downloading,
/// or `None` when nothing is available yet.
pub fn cached_pdfium_path() -> Option<PathBuf> {
    if let Some(p) = env_library_path() {
        return Some(p);
    }
    let info = detect_platform().ok()?;
    let p = pdfium_cache_dir().join(info.lib_name);
    p.exists().then_some(p)
}

/// Ensures the PDFium library is present locally and returns its path.
///
/// Blocking: may perform a network download on first use. Safe to call from
/// several threads; the resolved path is memoised for the process lifetime.
pub fn ensure_pdfium_library() -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = match cached_pdfium_path() {
        Some(p) => p,
        None => download_to_cache()?,
    };

    // A concurrent caller may have won the race; both paths are equivalent.
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Binds to a PDFium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    debug!("Binding PDFium from {}", path.display());
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn env_library_path() -> Option<PathBuf> {
    let raw = std::env::var("PDFIUM_LIB_PATH").ok()?;
    let p = PathBuf::from(raw);
    if p.exists() {
        Some(p)
    } else {
        warn!("PDFIUM_LIB_PATH '{}' does not exist; ignoring", p.display());
        None
    }
}

fn download_url(info: &PlatformInfo) -> String {
    format!("{BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", info.archive_name)
}

fn download_to_cache() -> Result<PathBuf, PdfiumAutoError> {
    let info = detect_platform()?;
    let cache_dir = pdfium_cache_dir();
    let lib_path = cache_dir.join(info.lib_name);

    std::fs::create_dir_all(&cache_dir).map_err(PdfiumAutoError::CacheDir)?;

    let url = download_url(&info);
    info!("Downloading PDFium {} from {}", PDFIUM_VERSION, url);

    let archive_bytes = download_bytes(&url)?;
    extract_library(&archive_bytes, info.lib_path_in_archive, &lib_path)?;

    info!("PDFium cached at {}", lib_path.display());
    Ok(lib_path)
}

fn download_bytes(url: &str) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_ARCHIVE_BYTES {
            return Err(PdfiumAutoError::Download(format!(
                "archive is {len} bytes, refusing anything over {MAX_ARCHIVE_BYTES}"
            )));
        }
    }

    let bytes = response
        .bytes()
        .map_err(|e| PdfiumAutoError::Download(format!("Read error: {e}")))?;
    debug!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Extracts one file from a gzipped tar archive into `dest_path`.
fn extract_library(
    archive_bytes: &[u8],
    lib_path_in_archive: &str,
    dest_path: &Path,
) -> Result<(), PdfiumAutoError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(archive_bytes));
    let entries = archive
        .entries()
        .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == lib_path_in_archive)
            .map_err(|e| PdfiumAutoError::Extract(e.to_string()))?;

        if matches {
            entry
                .unpack(dest_path)
                .map_err(|e| PdfiumAutoError::Extract(format!("Unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(PdfiumAutoError::Extract(format!(
        "Library '{lib_path_in_archive}' not found in archive"
    )))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
