use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::sync::{PredictionStore, Stop};

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<PredictionStore>,
    pub stops: Arc<HashMap<String, Stop>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of stops in the configuration
    pub configured_stops: usize,
    /// Number of stops with at least one cached fetch result
    pub cached_stops: usize,
    /// When the last refresh batch started
    pub last_refresh: DateTime<Utc>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        configured_stops: state.stops.len(),
        cached_stops: state.store.cached_stop_count().await,
        last_refresh: state.store.last_refreshed().await,
    })
}

pub fn router(store: Arc<PredictionStore>, stops: Arc<HashMap<String, Stop>>) -> Router {
    let state = HealthState { store, stops };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}
