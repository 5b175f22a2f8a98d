//! Health Surface (C7): two read-only `GET` endpoints on their own port,
//! separate from the (out-of-scope) catalog API, serving the counters
//! published by [`photosync_core::HealthState`].

use axum::{extract::State, routing::get, Json, Router};
use photosync_core::HealthState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Binds and serves the health surface until `shutdown` resolves.
pub async fn serve(
    port: u16,
    health: Arc<HealthState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(health);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_handler(State(health): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(health.health()).expect("HealthResponse always serializes"))
}

async fn stats_handler(State(health): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(health.stats()).expect("StatsResponse always serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router(health: Arc<HealthState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .with_state(health)
    }

    #[tokio::test]
    async fn health_endpoint_reports_unhealthy_before_anything_is_wired_up() {
        let health = Arc::new(HealthState::new());
        let app = router(health);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_endpoint_is_reachable() {
        let health = Arc::new(HealthState::new());
        let app = router(health);

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
