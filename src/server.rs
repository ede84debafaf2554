use crate::error::ResearchError;
use crate::extract::DEFAULT_TERM_LIMIT;
use crate::types::*;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
        .route("/api/search", post(search_handler))
        .route("/api/trending", get(trending_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "etsy-research",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        bots_status: state.pool().status(),
        cache_enabled: state.researcher.cache().is_enabled(),
        proxy_endpoints: state.config.proxy_endpoints.len(),
    })
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<Vec<ProductRecord>>, (StatusCode, Json<ErrorResponse>)> {
    info!("Search request: {} {}", query.keyword, query.product_type);
    match state.researcher.search_products(&query).await {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            let status = match &e {
                ResearchError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
                ResearchError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
                ResearchError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            };
            if status.is_server_error() {
                error!("Search error: {}", e);
            } else {
                warn!("Rejected search: {}", e);
            }
            Err((status, Json(ErrorResponse { error: e.to_string() })))
        }
    }
}

async fn trending_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingParams>,
) -> Json<TrendingResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_TERM_LIMIT);
    let trending = state.researcher.trending_terms(limit).await;
    Json(TrendingResponse {
        trending,
        updated: chrono::Utc::now().to_rfc3339(),
    })
}
