//! HTTP surface.
//!
//! | Method | Path                  | Result                                   |
//! |--------|-----------------------|------------------------------------------|
//! | GET    | `/`                   | upload form                              |
//! | POST   | `/`                   | `{"download_link": "/download/<id>"}`    |
//! | GET    | `/download/:job_id`   | zip attachment, or 404 `File not found`  |
//! | GET    | `/status`             | `{"status": "ok"}`                       |
//!
//! Validation failures are `400 {"error": "<reason>"}`; everything else that
//! goes wrong during a conversion is `500 {"error": "Failed to process PDF: <cause>"}`.

use crate::config::ServerConfig;
use crate::convert::Converter;
use crate::error::{ConvertError, StoreError, ValidationError};
use crate::job::{InFlightJobs, JobId};
use crate::pipeline::input::{UploadRequest, UploadedFile};
use crate::pipeline::render::PageRenderer;
use crate::store::JobStore;
use crate::sweep::Sweeper;
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "pdf";
/// Optional multipart field selecting `png` or `jpeg`.
pub const FORMAT_FIELD: &str = "format";

const DOWNLOAD_CHUNK: usize = 64 * 1024;
const UPLOAD_FORM: &str = include_str!("../assets/upload.html");

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    store: JobStore,
    converter: Converter,
    in_flight: InFlightJobs,
}

impl AppState {
    /// Open the job store under `config.data_dir` and wire the converter to
    /// `renderer`.
    pub fn new(config: ServerConfig, renderer: Arc<dyn PageRenderer>) -> Result<Self, StoreError> {
        let store = JobStore::open(&config)?;
        let in_flight = InFlightJobs::new();
        let converter = Converter::new(store.clone(), renderer, in_flight.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                converter,
                in_flight,
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn converter(&self) -> &Converter {
        &self.inner.converter
    }

    pub fn in_flight(&self) -> &InFlightJobs {
        &self.inner.in_flight
    }

    /// A sweeper over this state's store that respects its in-flight jobs.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.inner.store.clone(), self.inner.in_flight.clone(), &self.inner.config)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;
    Router::new()
        .route("/", get(upload_form).post(upload))
        .route("/download/:job_id", get(download))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Bodies ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub download_link: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            error_response(StatusCode::BAD_REQUEST, self.to_string())
        } else {
            error!("Conversion failed: {}", self);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process PDF: {self}"),
            )
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    // Not a multipart body at all, so there is no file part to find.
    let multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!("Upload is not multipart: {}", rejection.body_text());
            return error_response(
                StatusCode::BAD_REQUEST,
                ValidationError::MissingFile.to_string(),
            );
        }
    };

    let request = match read_upload(multipart).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match state.converter().convert(request).await {
        Ok(job) => Json(UploadResponse {
            download_link: job.download_link(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Collect the `pdf` file part and the `format` field. Only parts that carry
/// a filename count as files; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, Response> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Failed to read multipart field: {}", e);
        error_response(e.status(), e.body_text())
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            FILE_FIELD if request.file.is_none() => {
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content = field.bytes().await.map_err(|e| {
                    warn!("Failed to read upload body: {}", e);
                    error_response(e.status(), e.body_text())
                })?;
                debug!("Received '{}' ({} bytes)", filename, content.len());
                request.file = Some(UploadedFile {
                    filename,
                    content: content.to_vec(),
                });
            }
            FORMAT_FIELD if request.format.is_none() => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| error_response(e.status(), e.body_text()))?;
                request.format = Some(value);
            }
            _ => debug!("Ignoring multipart field '{}'", name),
        }
    }

    Ok(request)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

async fn download(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Some(id) = JobId::parse(&job_id) else {
        return not_found();
    };

    let store = state.store().clone();
    let opened = match tokio::task::spawn_blocking(move || store.open_archive(id)).await {
        Ok(result) => result,
        Err(e) => {
            error!("Archive lookup panicked: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let (file, len) = match opened {
        Ok(opened) => opened,
        Err(StoreError::NotFound { .. }) => return not_found(),
        Err(e) => {
            error!("Failed to open archive for {}: {}", id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The stream ends after the first read error.
    let file = tokio::fs::File::from_std(file);
    let stream = futures::stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(file)))
            }
            Err(e) => {
                warn!("Download stream failed: {}", e);
                Some((Err(e), None))
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{id}.zip\""),
            ),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}
