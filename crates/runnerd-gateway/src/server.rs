//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use runnerd_core::config::GatewayConfig;
use runnerd_supervisor::ProcessRegistry;

use crate::routes;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// The one registry instance, owned by the composition root.
    pub registry: Arc<ProcessRegistry>,
    /// Accepted API keys; empty means the gateway is open.
    pub api_keys: Vec<String>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(registry: Arc<ProcessRegistry>, config: &GatewayConfig) -> Self {
        Self {
            registry,
            api_keys: config.api_keys.clone(),
            start_time: std::time::Instant::now(),
        }
    }

    fn key_is_valid(&self, provided: &str) -> bool {
        self.api_keys.iter().any(|k| k == provided)
    }
}

/// API-key auth middleware: validates the `X-API-Key` header against the
/// configured key list. Missing key is 401, wrong key is 403; an empty
/// key list leaves the gateway open.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: axum::extract::Request,
    next: middleware::Next,
) -> axum::response::Response {
    if state.api_keys.is_empty() {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() {
        tracing::warn!("api key is missing");
        return routes::plain_error(axum::http::StatusCode::UNAUTHORIZED, "API key is missing");
    }
    if !state.key_is_valid(provided) {
        tracing::warn!("invalid api key provided");
        return routes::plain_error(axum::http::StatusCode::FORBIDDEN, "invalid API key");
    }
    next.run(req).await
}

/// Liveness endpoint, outside the auth layer.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "runnerd-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Build the full router: authenticated control routes plus the open
/// health endpoint, with request tracing and CORS on the outside.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/processes", get(routes::list_processes).post(routes::add_process))
        .route(
            "/processes/{name}",
            get(routes::process_status).delete(routes::remove_process),
        )
        .route("/processes/{name}/start", post(routes::start_process))
        .route("/processes/{name}/stop", post(routes::stop_process))
        .route("/rules", post(routes::create_rule))
        .route(
            "/processes/{name}/job",
            post(routes::assign_job).delete(routes::delete_job),
        )
        .route("/processes/{name}/job/start", post(routes::start_job))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve the gateway until the process exits.
pub async fn serve(state: AppState, config: &GatewayConfig) -> runnerd_core::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnerd_supervisor::StateStore;

    fn state_with_keys(keys: &[&str]) -> AppState {
        let base = std::env::temp_dir().join("runnerd-test-gw-state");
        let store = StateStore::new(&base.join("data"), &base.join("sched"));
        AppState {
            registry: Arc::new(ProcessRegistry::new(store)),
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            start_time: std::time::Instant::now(),
        }
    }

    #[test]
    fn test_key_validation() {
        let state = state_with_keys(&["alpha", "beta"]);
        assert!(state.key_is_valid("alpha"));
        assert!(state.key_is_valid("beta"));
        assert!(!state.key_is_valid("gamma"));
    }

    #[tokio::test]
    async fn test_router_builds() {
        let state = state_with_keys(&[]);
        let _app = router(Arc::new(state));
    }
}
