pub mod health;
pub mod predictions;

use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::sync::{PredictionStore, Stop};

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(store: Arc<PredictionStore>, stops: Arc<HashMap<String, Stop>>) -> Router {
    Router::new()
        .nest("/predictions", predictions::router(store.clone(), stops.clone()))
        .nest("/health", health::router(store, stops))
}
