//! Background refresh of departure predictions.
//!
//! One `RefreshManager` task owns all writes to the prediction store. It
//! checks the schedule rules once per check interval and, when a refresh
//! is due, fetches fresh predictions for every configured stop in turn.

pub mod schedule;
pub mod store;
pub mod types;

pub use store::PredictionStore;
pub use types::{Prediction, Stop};

use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::providers::{PredictError, Predictor};
use schedule::Rule;

/// Drives the periodic prediction refresh.
pub struct RefreshManager<P> {
    stops: Arc<HashMap<String, Stop>>,
    store: Arc<PredictionStore>,
    predictor: P,
    rules: Vec<Rule>,
    check_interval: Duration,
    timezone: Tz,
}

impl<P: Predictor> RefreshManager<P> {
    pub fn new(
        stops: Arc<HashMap<String, Stop>>,
        store: Arc<PredictionStore>,
        predictor: P,
        check_interval: Duration,
        timezone: Tz,
    ) -> Self {
        Self {
            stops,
            store,
            predictor,
            rules: schedule::default_rules(),
            check_interval,
            timezone,
        }
    }

    /// Run the refresh loop. Never returns.
    pub async fn start(self: Arc<Self>) {
        info!(
            stops = self.stops.len(),
            check_interval_secs = self.check_interval.as_secs(),
            timezone = %self.timezone,
            "Starting prediction refresh loop"
        );
        for (key, stop) in self.stops.iter() {
            info!(key = %key, name = %stop.name, direction = %stop.direction, "Watching stop");
        }

        // Initial refresh so the display has data as soon as possible.
        if let Err(e) = self.refresh_all().await {
            error!(error = %e, "Initial prediction refresh failed");
        }

        let mut interval = tokio::time::interval(self.check_interval);
        // Skip the first tick which fires immediately (we already refreshed above)
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One scheduling decision: consult the rules in the display's
    /// timezone and refresh if a cadence has elapsed.
    async fn tick(&self) {
        let now = Utc::now().with_timezone(&self.timezone);
        let last = self
            .store
            .last_refreshed()
            .await
            .with_timezone(&self.timezone);

        if schedule::should_refresh(&self.rules, now, last) {
            if let Err(e) = self.refresh_all().await {
                error!(error = %e, "Error refreshing predictions");
            }
        }
    }

    /// One refresh batch. The cycle start is stamped before any fetch so
    /// a slow batch cannot re-trigger itself; a failed batch therefore
    /// still resets the cadence clock. A failed fetch aborts the rest of
    /// the batch: stops written earlier in the batch keep their fresh
    /// values, the remainder keep their previous cached values, and the
    /// next attempt waits for the rules to fire again.
    async fn refresh_all(&self) -> Result<(), PredictError> {
        let cycle_start = Utc::now();
        self.store.set_last_refreshed(cycle_start).await;

        for (key, stop) in self.stops.iter() {
            let predictions = self.predictor.predict(key, stop).await?;
            self.store.write(key, predictions).await;
        }

        info!(stops = self.stops.len(), "Refreshed predictions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;
    use std::future::Future;
    use std::sync::Mutex;

    /// Deterministic predictor: scripted minutes or an error per stop
    /// key, with a log of the keys it was asked about, in call order.
    struct FakePredictor {
        results: Mutex<HashMap<String, Result<Vec<i32>, String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakePredictor {
        fn new() -> Self {
            Self {
                results: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn script(&self, stop_key: &str, result: Result<Vec<i32>, &str>) {
            self.results.lock().unwrap().insert(
                stop_key.to_string(),
                result.map_err(|e| e.to_string()),
            );
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Predictor for FakePredictor {
        fn predict(
            &self,
            stop_key: &str,
            _stop: &Stop,
        ) -> impl Future<Output = Result<Vec<Prediction>, PredictError>> + Send {
            self.calls.lock().unwrap().push(stop_key.to_string());
            let result = match self.results.lock().unwrap().get(stop_key) {
                Some(Ok(minutes)) => Ok(minutes
                    .iter()
                    .map(|&m| Prediction {
                        created_at: Utc::now(),
                        minutes: m,
                        stop_key: stop_key.to_string(),
                        source: "fake".to_string(),
                    })
                    .collect()),
                Some(Err(msg)) => Err(PredictError::Api(msg.clone())),
                None => Err(PredictError::Api(format!("unscripted stop: {stop_key}"))),
            };
            async move { result }
        }
    }

    fn make_stop(code: u32) -> Stop {
        Stop {
            agency: "SF-MUNI".to_string(),
            route: "N".to_string(),
            direction: "Inbound".to_string(),
            name: format!("Stop {code}"),
            code,
        }
    }

    fn make_manager(
        keys: &[&str],
        predictor: FakePredictor,
    ) -> RefreshManager<FakePredictor> {
        let stops: HashMap<String, Stop> = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| (k.to_string(), make_stop(i as u32 + 1)))
            .collect();
        RefreshManager::new(
            Arc::new(stops),
            Arc::new(PredictionStore::new()),
            predictor,
            Duration::from_secs(1),
            Los_Angeles,
        )
    }

    fn minutes_of(predictions: &[Prediction]) -> Vec<i32> {
        predictions.iter().map(|p| p.minutes).collect()
    }

    #[tokio::test]
    async fn refresh_writes_predictions_and_stamps_the_batch() {
        let fake = FakePredictor::new();
        fake.script("home", Ok(vec![5, 15]));
        let manager = make_manager(&["home"], fake);

        let before = Utc::now();
        manager.refresh_all().await.unwrap();

        let current = manager.store.current("home").await.unwrap();
        assert_eq!(minutes_of(&current), [5, 15]);
        assert_eq!(current[0].stop_key, "home");
        assert_eq!(current[0].source, "fake");
        assert!(manager.store.last_refreshed().await >= before);
    }

    #[tokio::test]
    async fn cache_is_stale_until_the_next_refresh() {
        let fake = FakePredictor::new();
        fake.script("home", Ok(vec![5, 15]));
        let manager = make_manager(&["home"], fake);

        manager.refresh_all().await.unwrap();
        manager.predictor.script("home", Ok(vec![7]));

        // No refresh has run, so the cache still holds the old list.
        let current = manager.store.current("home").await.unwrap();
        assert_eq!(minutes_of(&current), [5, 15]);

        manager.refresh_all().await.unwrap();
        let current = manager.store.current("home").await.unwrap();
        assert_eq!(minutes_of(&current), [7]);
    }

    #[tokio::test]
    async fn failed_fetch_aborts_the_batch_and_keeps_stale_values() {
        let fake = FakePredictor::new();
        fake.script("home", Ok(vec![1]));
        fake.script("work", Ok(vec![2]));
        let manager = make_manager(&["home", "work"], fake);
        manager.refresh_all().await.unwrap();

        manager.predictor.script("home", Ok(vec![10]));
        manager.predictor.script("work", Err("connection reset"));
        let result = manager.refresh_all().await;
        assert!(matches!(result, Err(PredictError::Api(_))));

        // Iteration order over the stop map is unspecified: stops fetched
        // before the failure hold fresh values, the rest keep stale ones.
        let calls = manager.predictor.calls();
        let second_batch = &calls[2..];
        let failed_at = second_batch.iter().position(|k| k == "work").unwrap();

        let home = manager.store.current("home").await.unwrap();
        if second_batch[..failed_at].contains(&"home".to_string()) {
            assert_eq!(minutes_of(&home), [10]);
        } else {
            assert_eq!(minutes_of(&home), [1]);
        }
        let work = manager.store.current("work").await.unwrap();
        assert_eq!(minutes_of(&work), [2]);
    }

    #[tokio::test]
    async fn a_fully_failed_batch_still_resets_the_cadence_clock() {
        let fake = FakePredictor::new();
        fake.script("home", Err("503"));
        let manager = make_manager(&["home"], fake);

        let before = Utc::now();
        assert!(manager.refresh_all().await.is_err());

        assert!(manager.store.last_refreshed().await >= before);
        assert_eq!(manager.store.current("home").await, None);
    }

    #[tokio::test]
    async fn tick_does_not_refresh_before_a_cadence_elapses() {
        let fake = FakePredictor::new();
        fake.script("home", Ok(vec![5]));
        let manager = make_manager(&["home"], fake);

        // Just refreshed: whichever rule governs right now, the shortest
        // cadence is 10 seconds.
        manager.store.set_last_refreshed(Utc::now()).await;
        manager.tick().await;

        assert!(manager.predictor.calls().is_empty());
        assert_eq!(manager.store.current("home").await, None);
    }

    #[tokio::test]
    async fn tick_refreshes_once_every_cadence_has_elapsed() {
        let fake = FakePredictor::new();
        fake.script("home", Ok(vec![5]));
        let manager = make_manager(&["home"], fake);

        // Longer ago than the longest cadence (60 seconds at night).
        manager
            .store
            .set_last_refreshed(Utc::now() - chrono::Duration::seconds(120))
            .await;
        manager.tick().await;

        let current = manager.store.current("home").await.unwrap();
        assert_eq!(minutes_of(&current), [5]);
    }
}
