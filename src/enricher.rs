use crate::data_models::{Coordinates, ReadingField};
use crate::db_operations::StoreWriter;
use crate::errors::PipelineError;
use crate::external_data::WeatherProvider;
use crate::metrics::METRICS;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Location most recently reported by a device, shared between the HTTP
/// surface (writer) and the enricher (reader).
#[derive(Debug, Clone, Default)]
pub struct LastKnownLocation(Arc<Mutex<Option<Coordinates>>>);

impl LastKnownLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, location: Coordinates) {
        *self.0.lock() = Some(location);
    }

    pub fn get(&self) -> Option<Coordinates> {
        *self.0.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Patched,
    NoReadings,
    NoLocation,
    WeatherUnavailable,
    StoreFailed,
}

/// Periodically writes the outdoor temperature onto the latest reading.
pub struct Enricher {
    weather: Arc<dyn WeatherProvider>,
    writer: StoreWriter,
    default_location: Option<Coordinates>,
    last_known: LastKnownLocation,
    interval: Duration,
    warned_no_location: bool,
}

impl Enricher {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        writer: StoreWriter,
        default_location: Option<Coordinates>,
        last_known: LastKnownLocation,
        interval: Duration,
    ) -> Self {
        Self {
            weather,
            writer,
            default_location,
            last_known,
            interval,
            warned_no_location: false,
        }
    }

    /// A device-reported location wins over the configured default.
    pub fn resolve_location(&self) -> Option<Coordinates> {
        self.last_known.get().or(self.default_location)
    }

    /// Runs one enrichment step. Failures are logged and end the step.
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(location) = self.resolve_location() else {
            if !self.warned_no_location {
                warn!("No location configured or reported yet; outdoor temperature enrichment is idle");
                self.warned_no_location = true;
            }
            METRICS.lock().record_enrichment_skipped();
            return TickOutcome::NoLocation;
        };

        let temperature = match self.weather.current_temperature(location).await {
            Ok(temperature) => temperature,
            Err(e) => {
                warn!("Skipping enrichment tick: {}", e);
                METRICS.lock().record_enrichment_failed();
                return TickOutcome::WeatherUnavailable;
            }
        };

        match self
            .writer
            .patch_latest(ReadingField::TemperatureOutside, temperature)
            .await
        {
            Ok(true) => {
                info!("Outdoor temperature {} °C written to latest reading", temperature);
                METRICS.lock().record_enrichment_patched();
                TickOutcome::Patched
            }
            Ok(false) => {
                debug!("No readings stored yet; nothing to enrich");
                METRICS.lock().record_enrichment_skipped();
                TickOutcome::NoReadings
            }
            Err(e) => {
                error!("Failed to write outdoor temperature: {}", e);
                METRICS.lock().record_enrichment_failed();
                TickOutcome::StoreFailed
            }
        }
    }

    /// Spawns the tick loop. The first tick runs immediately.
    ///
    /// Ticks never overlap: a tick that overruns the interval makes the loop
    /// skip the missed slots instead of bursting to catch up.
    pub fn start(mut self) -> EnricherHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            info!("Enricher running every {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                self.tick().await;
            }
            info!("Enricher stopped");
        });

        EnricherHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

pub struct EnricherHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EnricherHandle {
    /// Ends the loop after any in-progress tick completes.
    pub async fn stop(mut self) -> Result<(), PipelineError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.task.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_known_location_is_shared() {
        let location = LastKnownLocation::new();
        let reader = location.clone();
        assert_eq!(reader.get(), None);

        location.report(Coordinates { lat: 56.15, lon: 10.2 });
        assert_eq!(reader.get(), Some(Coordinates { lat: 56.15, lon: 10.2 }));
    }
}
