use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column names of the readings table, in insert order.
///
/// These names are shared with rows written by earlier producers and must
/// not change.
pub const READING_COLUMNS: [&str; 7] = [
    "timestamp",
    "energy_usage",
    "temperature_inside",
    "temperature_outside",
    "humidity",
    "voc_level",
    "pm25_level",
];

/// One canonical, timestamped telemetry record.
///
/// Every ingestion path converges to this shape regardless of the producer
/// firmware. `energy_usage` is always kilowatts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub energy_usage: f64,
    pub temperature_inside: Option<f64>,
    pub temperature_outside: Option<f64>,
    pub humidity: Option<f64>,
    pub voc_level: Option<f64>,
    pub pm25_level: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, energy_usage: f64) -> Self {
        Self {
            timestamp,
            energy_usage,
            temperature_inside: None,
            temperature_outside: None,
            humidity: None,
            voc_level: None,
            pm25_level: None,
        }
    }

    pub fn field(&self, field: ReadingField) -> Option<f64> {
        match field {
            ReadingField::TemperatureInside => self.temperature_inside,
            ReadingField::TemperatureOutside => self.temperature_outside,
            ReadingField::Humidity => self.humidity,
            ReadingField::VocLevel => self.voc_level,
            ReadingField::Pm25Level => self.pm25_level,
        }
    }

    pub fn set_field(&mut self, field: ReadingField, value: Option<f64>) {
        let slot = match field {
            ReadingField::TemperatureInside => &mut self.temperature_inside,
            ReadingField::TemperatureOutside => &mut self.temperature_outside,
            ReadingField::Humidity => &mut self.humidity,
            ReadingField::VocLevel => &mut self.voc_level,
            ReadingField::Pm25Level => &mut self.pm25_level,
        };
        *slot = value;
    }
}

/// The optional climate columns of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingField {
    TemperatureInside,
    TemperatureOutside,
    Humidity,
    VocLevel,
    Pm25Level,
}

impl ReadingField {
    pub const ALL: [ReadingField; 5] = [
        ReadingField::TemperatureInside,
        ReadingField::TemperatureOutside,
        ReadingField::Humidity,
        ReadingField::VocLevel,
        ReadingField::Pm25Level,
    ];

    pub fn column(self) -> &'static str {
        match self {
            ReadingField::TemperatureInside => "temperature_inside",
            ReadingField::TemperatureOutside => "temperature_outside",
            ReadingField::Humidity => "humidity",
            ReadingField::VocLevel => "voc_level",
            ReadingField::Pm25Level => "pm25_level",
        }
    }
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_columns_match_table_columns() {
        for field in ReadingField::ALL {
            assert!(READING_COLUMNS.contains(&field.column()));
        }
    }

    #[test]
    fn test_set_field_only_touches_one_column() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let mut reading = Reading::new(ts, 1.2);
        reading.set_field(ReadingField::TemperatureOutside, Some(7.5));

        assert_eq!(reading.field(ReadingField::TemperatureOutside), Some(7.5));
        assert_eq!(reading.temperature_inside, None);
        assert_eq!(reading.energy_usage, 1.2);
    }

    #[test]
    fn test_reading_serializes_with_column_names() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let value = serde_json::to_value(Reading::new(ts, 0.5)).unwrap();

        assert_eq!(value["energy_usage"], 0.5);
        assert!(value["temperature_outside"].is_null());
        assert!(value.get("timestamp").is_some());
    }
}
