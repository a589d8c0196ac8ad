//! CLI binary for edgequake-pdf2img.
//!
//! A thin shim over the library crate: maps flags to `ServerConfig`, binds
//! PDFium, then runs the HTTP server and the expiry sweeper until Ctrl+C or
//! SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::{router, AppState, PdfiumRenderer, ServerConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENDPOINTS:
  GET  /                     Upload form
  POST /                     multipart: pdf=<file>, format=png|jpeg
  GET  /download/<job_id>    Zip of page_1.ext … page_N.ext
  GET  /status               Health check

STORAGE:
  <data-dir>/uploads/<id>.pdf, <data-dir>/outputs/<id>/, <data-dir>/zips/<id>.zip
  Anything older than --retention-secs is deleted by the sweeper.

PDF ENGINE:
  On first run the PDFium library (~30 MB) is downloaded to
  ~/.cache/pdf2img/pdfium-7690/. To use an existing copy:
  PDFIUM_LIB_PATH=/path/to/libpdfium pdf2img
"#;

/// Serve a PDF → page images → zip converter over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Serve a PDF to page-images converter over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "PDF2IMG_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Parent directory of uploads/, outputs/ and zips/.
    #[arg(long, env = "PDF2IMG_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Delete stored artifacts older than this many seconds.
    #[arg(long, env = "PDF2IMG_RETENTION_SECS", default_value_t = 120)]
    retention_secs: u64,

    /// Seconds between two sweep cycles.
    #[arg(long, env = "PDF2IMG_SWEEP_INTERVAL_SECS", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_secs: u64,

    /// Maximum upload size in MiB.
    #[arg(long, env = "PDF2IMG_MAX_UPLOAD_MB", default_value_t = 20,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_upload_mb: u64,

    /// Page magnification factor (0.25–10).
    #[arg(long, env = "PDF2IMG_SCALE", default_value_t = 6.0)]
    scale: f32,

    /// Path to an existing PDFium library; skips the download.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let mut builder = ServerConfig::builder()
        .data_dir(&cli.data_dir)
        .retention(Duration::from_secs(cli.retention_secs))
        .sweep_interval(Duration::from_secs(cli.sweep_interval_secs))
        .max_upload_bytes(cli.max_upload_mb as usize * 1024 * 1024)
        .render_scale(cli.scale);
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "edgequake_pdf2img=debug,pdfium_auto=debug,tower_http=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).context("Invalid configuration")?;
    info!("Starting pdf2img v{} ({:?})", env!("CARGO_PKG_VERSION"), config);

    // ── Ensure PDFium engine is available ───────────────────────────────
    if config.pdfium_library.is_none() && pdfium_auto::cached_pdfium_path().is_none() {
        info!("PDFium not found locally; downloading (one-time, ~30 MB)…");
    }
    let bind_config = config.clone();
    let renderer = tokio::task::spawn_blocking(move || PdfiumRenderer::bind(&bind_config))
        .await
        .context("PDFium setup task failed")?
        .context("Failed to load the PDFium engine")?;
    info!("PDF engine ready ({})", renderer.library().display());

    let state = AppState::new(config, Arc::new(renderer)).context("Failed to open job store")?;
    let sweeper = state.sweeper().spawn();

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    served.context("Server error")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM. If a handler cannot be
/// installed that source is ignored rather than ending the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown…"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown…"),
    }
}
