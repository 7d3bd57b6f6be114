//! Translation of pipeline errors into HTTP responses

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use sa_core::AnalysisError;
use serde::{Deserialize, Serialize};

/// Error body returned to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// An HTTP error with a human-readable detail
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

/// Status code for each pipeline failure
pub fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::Input(_) | AnalysisError::Download(_) | AnalysisError::Parse(_) => {
            StatusCode::BAD_REQUEST
        }
        AnalysisError::DownloadTooLarge { .. } | AnalysisError::UploadTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        AnalysisError::BackendUnavailable(_) | AnalysisError::Analysis(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AnalysisError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!("Analysis failed: {}", err);
        } else {
            tracing::info!("Rejected request: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AnalysisError::input("empty"), 400),
            (AnalysisError::Download("HTTP 404".into()), 400),
            (AnalysisError::DownloadTooLarge { limit: 1 }, 413),
            (AnalysisError::UploadTooLarge { limit: 1 }, 413),
            (AnalysisError::Parse("status Error".into()), 400),
            (AnalysisError::BackendUnavailable("none".into()), 500),
            (AnalysisError::analysis("boom"), 500),
            (AnalysisError::Timeout(Duration::from_secs(1)), 503),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{err}");
        }
    }

    #[test]
    fn test_detail_is_error_message() {
        let api = ApiError::from(AnalysisError::input("Uploaded file is empty"));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.detail, "Uploaded file is empty");
    }
}
