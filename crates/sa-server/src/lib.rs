//! STEP analyzer HTTP service
//!
//! - `GET /healthz`
//! - `POST /analyze`: multipart upload (`file`), or `?url=` to download
//! - `POST /analyze-url`: JSON `{file_url, material?, density_kg_m3?}`

pub mod config;
pub mod error;
pub mod state;

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::Method;
use sa_core::{
    AnalysisError, AnalysisResult, MaterialSpec, RawFileBytes, analyze_step, download,
    validate_upload,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

/// Room for multipart boundaries and text fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the service router
pub fn app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/analyze", post(analyze))
        .route("/analyze-url", post(analyze_url))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: Option<String>,
    pub backend_available: bool,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = state.kernel.is_available();
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: available.then(|| state.kernel.name().to_string()),
        backend_available: available,
    })
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeQuery {
    material: Option<String>,
    density_kg_m3: Option<f64>,
    /// Older clients send `density`
    density: Option<f64>,
    url: Option<String>,
}

/// Fields read from a multipart body
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(Option<String>, Vec<u8>)>,
    material: Option<String>,
    density_kg_m3: Option<f64>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                form.file = Some((filename, data.to_vec()));
            }
            "material" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    form.material = Some(text);
                }
            }
            "density_kg_m3" | "density" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    let density = text.trim().parse().map_err(|_| {
                        ApiError::bad_request(format!("Invalid {}: '{}'", name, text))
                    })?;
                    form.density_kg_m3 = Some(density);
                }
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(form)
}

async fn analyze(
    State(state): State<AppState>,
    query: Result<Query<AnalyzeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let form = match multipart {
        Ok(multipart) => read_form(multipart).await?,
        Err(_) => UploadForm::default(),
    };

    let spec = MaterialSpec::new(
        form.material.or(query.material),
        form.density_kg_m3
            .or(query.density_kg_m3)
            .or(query.density),
    );

    // An uploaded file takes precedence over `?url=`
    match (form.file, query.url) {
        (Some((filename, data)), _) => {
            if data.len() as u64 > state.config.max_upload_bytes {
                return Err(AnalysisError::UploadTooLarge {
                    limit: state.config.max_upload_bytes,
                }
                .into());
            }
            let bytes = RawFileBytes::new(data);
            validate_upload(filename.as_deref(), &bytes)?;
            tracing::info!(
                "Analyzing upload {} ({} bytes)",
                filename.as_deref().unwrap_or("<unnamed>"),
                bytes.len()
            );
            run_analysis(&state, bytes, spec).await.map(Json)
        }
        (None, Some(url)) => {
            let bytes = fetch(&state, url.clone()).await?;
            let result = run_analysis(&state, bytes, spec).await?;
            Ok(Json(result.with_source(url)))
        }
        (None, None) => Err(ApiError::bad_request(
            "Provide a 'file' upload or a 'url' query parameter",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeUrlRequest {
    file_url: String,
    material: Option<String>,
    density_kg_m3: Option<f64>,
}

async fn analyze_url(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeUrlRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let spec = MaterialSpec::new(request.material, request.density_kg_m3);

    let bytes = fetch(&state, request.file_url.clone()).await?;
    let result = run_analysis(&state, bytes, spec).await?;
    Ok(Json(result.with_source(request.file_url)))
}

/// Download on the blocking pool
async fn fetch(state: &AppState, url: String) -> Result<RawFileBytes, ApiError> {
    tracing::info!("Fetching {}", url);
    let limits = state.config.download_limits();
    let bytes = tokio::task::spawn_blocking(move || download(&url, &limits))
        .await
        .map_err(|e| ApiError::internal(format!("Download task failed: {}", e)))??;
    Ok(bytes)
}

/// Run the pipeline on the blocking pool under the concurrency limit and
/// deadline
///
/// When the deadline passes the request fails, but the blocking task runs to
/// completion so its shape and scratch file are still released.
async fn run_analysis(
    state: &AppState,
    bytes: RawFileBytes,
    spec: MaterialSpec,
) -> Result<AnalysisResult, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analysis", %request_id);
    let deadline = state.config.analysis_timeout();
    let kernel = Arc::clone(&state.kernel);
    let permits = Arc::clone(&state.permits);
    let scratch_dir = state.config.scratch_dir.clone();

    let work = async move {
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| AnalysisError::analysis("Analysis workers are shut down"))?;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _entered = span.enter();
            analyze_step(kernel.as_ref(), &bytes, &spec, scratch_dir.as_deref())
        })
        .await
        .map_err(|e| AnalysisError::analysis(format!("Analysis task failed: {}", e)))?
    };

    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            tracing::warn!(%request_id, "Analysis exceeded {:?}", deadline);
            Err(AnalysisError::Timeout(deadline).into())
        }
    }
}
