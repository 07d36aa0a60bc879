//! Rutas HTTP
//!
//! Ensambla el router completo: API de despacho, health check y métricas.

pub mod dispatch_routes;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::warn;

use crate::middleware::cors::cors_layer;
use crate::state::AppState;
use crate::utils::metrics;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/dispatch", dispatch_routes::create_dispatch_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "connected",
            Err(e) => {
                warn!("⚠️ Health check de PostgreSQL falló: {}", e);
                "unreachable"
            }
        },
        None => "not_configured",
    };
    let redis = match &state.redis {
        Some(client) if client.is_connected().await => "connected",
        Some(_) => "unreachable",
        None => "not_configured",
    };

    let healthy = database != "unreachable";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "service": "bus-station-dispatch",
            "status": if healthy { "healthy" } else { "degraded" },
            "environment": state.config.environment,
            "store": state.store_kind(),
            "database": database,
            "redis": redis,
            "event_subscribers": state.workflow.events().subscriber_count(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
