use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};

use crate::error::AnalysisError;
use crate::handlers::FoodAnalyzer;
use crate::models::{AnalysisResponse, AnalyzeFoodRequest};

pub struct AppState {
    pub analyzer: FoodAnalyzer,
}

pub fn create_router(analyzer: FoodAnalyzer, max_body_bytes: usize) -> Router {
    let state = Arc::new(AppState { analyzer });

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route(
            "/api/analyze-food",
            post(analyze_food_handler).fallback(method_not_allowed),
        )
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(state)
}

async fn analyze_food_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeFoodRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let Json(request) = payload.map_err(|rejection| {
        AnalysisError::InvalidRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let analysis = state
        .analyzer
        .analyze(request.base64_image.as_deref())
        .await?;

    if !analysis.warnings.is_empty() {
        log::debug!(
            "📝 Returning {} item(s) with {} calorie warning(s)",
            analysis.response.metadata.items_detected,
            analysis.warnings.len()
        );
    }

    Ok(Json(analysis.response))
}

async fn method_not_allowed() -> AnalysisError {
    AnalysisError::MethodNotAllowed
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    log::error!("💥 Request handler panicked: {}", detail);
    AnalysisError::Internal("request handler panicked".to_string()).into_response()
}

async fn root_handler() -> &'static str {
    "Food Vision Proxy - POST a base64Image to /api/analyze-food"
}

async fn health_check() -> &'static str {
    "OK"
}
