use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use soilsense_engine::{Preferences, WeatherOutlook};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::acquisition::Controller;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub weather: Arc<WeatherOutlook>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/irrigation", get(api_irrigation))
        .route("/api/nitrate", get(api_nitrate))
        .route("/api/refresh", post(api_refresh))
        .route("/api/preferences", post(api_preferences))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshot(&state.weather).await)
}

fn no_reading() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "no reading available yet" })),
    )
        .into_response()
}

async fn api_irrigation(State(state): State<AppState>) -> Response {
    match state.controller.snapshot(&state.weather).await.irrigation {
        Some(rec) => Json(rec).into_response(),
        None => no_reading(),
    }
}

async fn api_nitrate(State(state): State<AppState>) -> Response {
    match state.controller.snapshot(&state.weather).await.nitrate {
        Some(risk) => Json(risk).into_response(),
        None => no_reading(),
    }
}

async fn api_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.refresh().await;
    Json(state.controller.snapshot(&state.weather).await)
}

async fn api_preferences(
    State(state): State<AppState>,
    Json(prefs): Json<Preferences>,
) -> Response {
    if state.controller.update_preferences(&prefs).await {
        return Json(json!({ "message": "Preferences updated" })).into_response();
    }
    let error = state
        .controller
        .last_error()
        .await
        .unwrap_or_else(|| "Failed to update preferences".to_string());
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": error }))).into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "web api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
