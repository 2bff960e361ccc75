//! Upstream prediction providers.

pub mod five_eleven;

pub use five_eleven::FiveElevenClient;

use std::future::Future;
use thiserror::Error;

use crate::sync::{Prediction, Stop};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Capability of turning a configured stop into an ordered list of
/// departure predictions with exactly one provider round trip. The
/// refresh loop depends on this abstractly; tests drive it with a
/// deterministic fake.
pub trait Predictor: Send + Sync {
    fn predict(
        &self,
        stop_key: &str,
        stop: &Stop,
    ) -> impl Future<Output = Result<Vec<Prediction>, PredictError>> + Send;
}
