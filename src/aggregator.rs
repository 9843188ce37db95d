use crate::data_models::Reading;
use crate::db_operations::ReadingStore;
use crate::errors::StoreError;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// Energy usage statistics over `[window_start, window_end]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateWindow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_count: u64,
    pub total: f64,
    pub average: f64,
}

impl AggregateWindow {
    /// Unweighted mean of `energy_usage`. An empty window averages to zero.
    pub fn compute(readings: &[Reading], window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        let sample_count = readings.len() as u64;
        let total: f64 = readings.iter().map(|r| r.energy_usage).sum();
        let average = if sample_count == 0 {
            0.0
        } else {
            total / sample_count as f64
        };

        Self {
            window_start,
            window_end,
            sample_count,
            total,
            average,
        }
    }
}

/// Start of the trailing `window` ending at `now`, clamped to the earliest
/// representable instant.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Read side of the pipeline. Every call goes to the store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn ReadingStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    pub async fn latest(&self) -> Result<Option<Reading>, StoreError> {
        self.store.select_latest().await
    }

    /// Average over the trailing `window` ending now.
    pub async fn average(&self, window: Duration) -> Result<AggregateWindow, StoreError> {
        self.average_at(window, Utc::now()).await
    }

    pub async fn average_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<AggregateWindow, StoreError> {
        let window_start = window_start(now, window);
        let readings = self.store.select_since(window_start).await?;
        let aggregate = AggregateWindow::compute(&readings, window_start, now);

        debug!(
            "Aggregated {} readings since {}: average {:.3} kW",
            aggregate.sample_count, window_start, aggregate.average
        );
        Ok(aggregate)
    }
}
