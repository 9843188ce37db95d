use crate::broker::{BrokerEvent, BrokerSession};
use crate::data_models::{Coordinates, Reading, ReadingField};
use crate::db_operations::ReadingStore;
use crate::errors::{BrokerError, StoreError, WeatherError};
use crate::external_data::WeatherProvider;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reading store backed by a vector.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Reading>>,
    failing: AtomicBool,
    insert_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_rows(rows: Vec<Reading>) -> Arc<Self> {
        let store = Self::default();
        *store.rows.lock() = rows;
        Arc::new(store)
    }

    pub fn rows(&self) -> Vec<Reading> {
        self.rows.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::DbPoolError("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.rows.lock().push(reading.clone());
        Ok(())
    }

    async fn select_latest(&self) -> Result<Option<Reading>, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().iter().max_by_key(|r| r.timestamp).cloned())
    }

    async fn select_since(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        self.check_available()?;
        let mut rows: Vec<Reading> = self
            .rows
            .lock()
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn update_latest_field(
        &self,
        field: ReadingField,
        value: f64,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock();
        match rows.iter_mut().max_by_key(|r| r.timestamp) {
            Some(reading) => {
                reading.set_field(field, Some(value));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Broker session that replays a fixed list of events.
///
/// Once the script runs out it reports `Closed`, or waits forever when
/// built with [`ScriptedSession::held_open`].
pub struct ScriptedSession {
    events: VecDeque<BrokerEvent>,
    hold_open: bool,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub disconnected: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn new(events: Vec<BrokerEvent>) -> Self {
        Self {
            events: events.into(),
            hold_open: false,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn held_open(events: Vec<BrokerEvent>) -> Self {
        Self {
            hold_open: true,
            ..Self::new(events)
        }
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn subscribe(&mut self, topic_pattern: &str) -> Result<(), BrokerError> {
        self.subscriptions.lock().push(topic_pattern.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> BrokerEvent {
        match self.events.pop_front() {
            Some(event) => event,
            None if self.hold_open => std::future::pending().await,
            None => BrokerEvent::Closed,
        }
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn message(topic: &str, payload: &str) -> BrokerEvent {
    BrokerEvent::Message {
        topic: topic.to_string(),
        payload: Bytes::copy_from_slice(payload.as_bytes()),
    }
}

/// Weather provider that always gives the same answer. `None` answers as
/// an HTTP 504.
pub struct FakeWeather {
    outcome: Option<f64>,
    first_call_delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    locations: Mutex<Vec<Coordinates>>,
}

impl FakeWeather {
    fn with_outcome(outcome: Option<f64>) -> Self {
        Self {
            outcome,
            first_call_delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(temperature: f64) -> Self {
        Self::with_outcome(Some(temperature))
    }

    pub fn failing() -> Self {
        Self::with_outcome(None)
    }

    pub fn with_first_call_delay(mut self, delay: Duration) -> Self {
        self.first_call_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn locations(&self) -> Vec<Coordinates> {
        self.locations.lock().clone()
    }
}

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn current_temperature(&self, location: Coordinates) -> Result<f64, WeatherError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.locations.lock().push(location);

        if call == 1 {
            if let Some(delay) = self.first_call_delay {
                tokio::time::sleep(delay).await;
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcome.ok_or(WeatherError::Status { status: 504 })
    }
}
