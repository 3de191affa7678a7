//! HTTP control surface
//!
//! The small JSON API the rest of the pipeline talks to. Ports, prefixes,
//! and authentication are deployment concerns handled outside this
//! process; the routes here are the whole contract.

use crate::orchestrator::Orchestrator;
use crate::AgentError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the router with all GPU management routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/gpu/status", get(status))
        .route("/gpu/prepare-phase/:phase", post(prepare_phase))
        .route("/gpu/service/:name/start", post(start_service))
        .route("/gpu/service/:name/stop", post(stop_service))
        .route("/gpu/release-all", post(release_all))
        .route("/gpu/lock/release", post(release_lock))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!("request failed ({}): {}", self.category(), self);
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.category(),
        }));
        (status, body).into_response()
    }
}

async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, AgentError> {
    let report = state.orchestrator.status().await?;
    Ok(Json(report))
}

async fn prepare_phase(
    State(state): State<AppState>,
    Path(phase): Path<u32>,
) -> Result<impl IntoResponse, AgentError> {
    if !mux_core::PHASE_RANGE.contains(&phase) {
        return Err(AgentError::InvalidArgument(format!(
            "phase {} out of range [1, 5]",
            phase
        )));
    }
    let success = state.orchestrator.prepare_for_phase(phase).await?;
    Ok(Json(json!({ "success": success, "phase": phase })))
}

async fn start_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AgentError> {
    state.orchestrator.start_service(&name).await?;
    Ok(Json(json!({ "success": true, "service": name })))
}

#[derive(Debug, Deserialize)]
struct StopParams {
    #[serde(default)]
    force: bool,
}

async fn stop_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<StopParams>,
) -> Result<impl IntoResponse, AgentError> {
    state.orchestrator.stop_service(&name, params.force).await?;
    Ok(Json(json!({ "success": true, "service": name })))
}

async fn release_all(State(state): State<AppState>) -> Result<impl IntoResponse, AgentError> {
    state.orchestrator.release_all().await?;
    Ok(Json(json!({ "success": true })))
}

async fn release_lock(State(state): State<AppState>) -> Result<impl IntoResponse, AgentError> {
    let released = state.orchestrator.force_release_lock().await?;
    Ok(Json(json!({ "released": released })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let mut config = AgentConfig::default();
        config.agent.gpu_backend = "mock".to_string();
        config.agent.lock_store = "memory".to_string();
        let orchestrator = Arc::new(Orchestrator::from_config(&config).await.unwrap());
        AppState { orchestrator }
    }

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(test_state().await);
        let (status, body) = send(app, "GET", "/gpu/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vram"]["total_mb"], 24576);
        assert!(body["lock"]["holder"].is_null());
        assert_eq!(body["services"]["comfyui"]["priority"], 100);
    }

    #[tokio::test]
    async fn test_prepare_phase_out_of_range() {
        let app = router(test_state().await);
        let (status, body) = send(app, "POST", "/gpu/prepare-phase/9").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_prepare_empty_phase_succeeds() {
        let app = router(test_state().await);
        // Phase 1 needs no GPU service, so this succeeds without touching
        // docker or any process.
        let (status, body) = send(app, "POST", "/gpu/prepare-phase/1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["phase"], 1);
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        let app = router(test_state().await);
        let (status, body) = send(app, "POST", "/gpu/service/ghost/start").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_service");
    }

    #[tokio::test]
    async fn test_lock_release_without_lock() {
        let app = router(test_state().await);
        let (status, body) = send(app, "POST", "/gpu/lock/release").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["released"], false);
    }

    #[tokio::test]
    async fn test_release_all_with_nothing_running() {
        let app = router(test_state().await);
        let (status, body) = send(app, "POST", "/gpu/release-all").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
}
