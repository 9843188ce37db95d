use crate::data_models::{Reading, ReadingField};
use crate::errors::Rejection;
use crate::validation::{sanitize_climate, validate_energy_usage};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Topic fragment that identifies electricity meter messages.
pub const METER_TOPIC_MARKER: &str = "electricitymeter";

/// The power payload layouts sent by the supported meter firmwares.
///
/// Each variant carries the raw number it was found with; the unit rule
/// belongs to the variant, not to the topic the message arrived on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadShape {
    /// `electricitymeter.power.value`, in watts.
    MeterPowerWatts(f64),
    /// `power.value`, already in kilowatts.
    PowerKilowatts(f64),
    /// `data[0]`, in watts.
    DataArrayWatts(f64),
}

impl PayloadShape {
    /// Probes the known layouts in priority order; the first numeric hit wins.
    pub fn detect(body: &Value) -> Option<Self> {
        if let Some(watts) = body
            .pointer("/electricitymeter/power/value")
            .and_then(Value::as_f64)
        {
            return Some(PayloadShape::MeterPowerWatts(watts));
        }

        if let Some(kilowatts) = body.pointer("/power/value").and_then(Value::as_f64) {
            return Some(PayloadShape::PowerKilowatts(kilowatts));
        }

        body.get("data")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .and_then(Value::as_f64)
            .map(PayloadShape::DataArrayWatts)
    }

    pub fn kilowatts(self) -> f64 {
        match self {
            PayloadShape::MeterPowerWatts(watts) | PayloadShape::DataArrayWatts(watts) => {
                watts / 1000.0
            }
            PayloadShape::PowerKilowatts(kilowatts) => kilowatts,
        }
    }
}

/// Turns raw broker messages into readings.
#[derive(Debug, Clone)]
pub struct PayloadNormalizer {
    topic_marker: String,
}

impl Default for PayloadNormalizer {
    fn default() -> Self {
        Self::new(METER_TOPIC_MARKER)
    }
}

impl PayloadNormalizer {
    pub fn new(topic_marker: impl Into<String>) -> Self {
        Self {
            topic_marker: topic_marker.into(),
        }
    }

    pub fn is_meter_topic(&self, topic: &str) -> bool {
        topic.contains(self.topic_marker.as_str())
    }

    /// Normalizes one message received at `received_at`.
    ///
    /// Topics without the meter marker are rejected with
    /// [`Rejection::IgnoredTopic`] before the payload is looked at.
    pub fn normalize(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<Reading, Rejection> {
        if !self.is_meter_topic(topic) {
            return Err(Rejection::IgnoredTopic {
                topic: topic.to_string(),
            });
        }

        let body: Value =
            serde_json::from_slice(payload).map_err(|source| Rejection::InvalidPayload {
                topic: topic.to_string(),
                raw: payload.to_vec(),
                source,
            })?;

        let shape = PayloadShape::detect(&body).ok_or_else(|| Rejection::NoPowerValue {
            topic: topic.to_string(),
            raw: payload.to_vec(),
        })?;

        let energy_usage = validate_energy_usage(shape.kilowatts()).map_err(|_| {
            Rejection::InvalidEnergyUsage {
                topic: topic.to_string(),
                value: shape.kilowatts(),
                raw: payload.to_vec(),
            }
        })?;

        let mut reading = Reading::new(received_at, energy_usage);
        copy_climate_fields(&body, &mut reading);
        sanitize_climate(&mut reading);
        Ok(reading)
    }
}

// Some producers publish the climate columns next to the power value.
fn copy_climate_fields(body: &Value, reading: &mut Reading) {
    for field in ReadingField::ALL {
        if let Some(value) = body.get(field.column()).and_then(Value::as_f64) {
            reading.set_field(field, Some(value));
        }
    }
}
