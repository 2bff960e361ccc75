//! Type definitions for the prediction refresh pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A configured transit stop and the information required to query
/// prediction data for it. Loaded once at startup; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Stop {
    pub agency: String,
    pub route: String,
    pub direction: String,
    pub name: String,
    /// Provider-specific numeric stop code used in upstream requests
    pub code: u32,
}

/// One predicted departure from a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Prediction {
    pub created_at: DateTime<Utc>,
    /// Minutes until departure; zero or negative means the vehicle is due
    pub minutes: i32,
    /// Key of the stop this prediction belongs to
    pub stop_key: String,
    /// Name of the provider that produced this prediction
    pub source: String,
}
