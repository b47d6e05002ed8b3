use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorBody;

/// Failure stages of a single food analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Only POST allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Failed to reach the vision API: {0}")]
    UpstreamTransport(String),

    #[error("Vision API error ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Malformed response from vision API: {0}")]
    MalformedUpstreamResponse(String),

    #[error("Invalid nutrition data: {0}")]
    InvalidNutritionData(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AnalysisError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AnalysisError::UpstreamTransport(_)
            | AnalysisError::UpstreamRejected { .. }
            | AnalysisError::MalformedUpstreamResponse(_)
            | AnalysisError::InvalidNutritionData(_)
            | AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short caller-facing message; the variant payload goes to `details`.
    fn summary(&self) -> String {
        match self {
            AnalysisError::MethodNotAllowed => "Only POST allowed".to_string(),
            AnalysisError::InvalidRequest(message) => message.clone(),
            AnalysisError::UpstreamTransport(_) => "Failed to reach the vision API".to_string(),
            AnalysisError::UpstreamRejected { status, .. } => {
                format!("Vision API request failed with status {}", status)
            }
            AnalysisError::MalformedUpstreamResponse(_) => {
                "Vision API returned an unreadable response".to_string()
            }
            AnalysisError::InvalidNutritionData(_) => "Invalid nutrition data format".to_string(),
            AnalysisError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            AnalysisError::MethodNotAllowed | AnalysisError::InvalidRequest(_) => None,
            AnalysisError::UpstreamTransport(detail)
            | AnalysisError::MalformedUpstreamResponse(detail)
            | AnalysisError::InvalidNutritionData(detail)
            | AnalysisError::Internal(detail) => Some(detail.clone()),
            AnalysisError::UpstreamRejected { message, .. } => Some(message.clone()),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.summary(),
            details: self.details(),
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("❌ Analysis failed: {}", self);
        } else {
            log::warn!("⚠️ Rejected request: {}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}
