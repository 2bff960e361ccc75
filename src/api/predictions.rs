use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use super::ErrorResponse;
use crate::sync::{Prediction, PredictionStore, Stop};

#[derive(Clone)]
pub struct PredictionsState {
    pub store: Arc<PredictionStore>,
    pub stops: Arc<HashMap<String, Stop>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PredictionListResponse {
    /// When the last refresh batch started (batch-level, not per-stop)
    pub last_refresh: DateTime<Utc>,
    pub stops: HashMap<String, Vec<Prediction>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopPredictionsResponse {
    /// When the last refresh batch started (batch-level, not per-stop)
    pub last_refresh: DateTime<Utc>,
    pub stop: Stop,
    pub predictions: Vec<Prediction>,
}

/// List cached predictions for every stop that has been fetched at
/// least once
#[utoipa::path(
    get,
    path = "/api/predictions",
    responses(
        (status = 200, description = "Cached predictions keyed by stop key", body = PredictionListResponse)
    ),
    tag = "predictions"
)]
pub async fn list_predictions(
    State(state): State<PredictionsState>,
) -> Json<PredictionListResponse> {
    let last_refresh = state.store.last_refreshed().await;
    let stops = state.store.all().await;
    Json(PredictionListResponse { last_refresh, stops })
}

/// Cached predictions for one stop by its configured key
#[utoipa::path(
    get,
    path = "/api/predictions/{stop_key}",
    params(
        ("stop_key" = String, Path, description = "Configured stop key, e.g. \"home\"")
    ),
    responses(
        (status = 200, description = "Predictions for the stop (cached; empty until the first successful fetch)", body = StopPredictionsResponse),
        (status = 404, description = "Unknown stop key", body = ErrorResponse)
    ),
    tag = "predictions"
)]
pub async fn get_predictions_by_stop(
    State(state): State<PredictionsState>,
    Path(stop_key): Path<String>,
) -> Response {
    let stop = match state.stops.get(&stop_key) {
        Some(stop) => stop.clone(),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Unknown stop key: {}", stop_key),
                }),
            )
                .into_response();
        }
    };

    let last_refresh = state.store.last_refreshed().await;
    // A configured stop that has never been fetched (or whose every fetch
    // failed) has no cache entry; it serves as an empty list, not a 404.
    let predictions = state.store.current(&stop_key).await.unwrap_or_default();

    Json(StopPredictionsResponse {
        last_refresh,
        stop,
        predictions,
    })
    .into_response()
}

pub fn router(store: Arc<PredictionStore>, stops: Arc<HashMap<String, Stop>>) -> Router {
    let state = PredictionsState { store, stops };
    Router::new()
        .route("/", get(list_predictions))
        .route("/{stop_key}", get(get_predictions_by_stop))
        .with_state(state)
}
