//! Range checks applied to readings and coordinates.

use crate::data_models::{Coordinates, Reading, ReadingField};
use log::warn;

/// Checks the normalized energy usage of a reading.
///
/// Returns the value unchanged when it is finite and non-negative.
pub fn validate_energy_usage(value: f64) -> Result<f64, String> {
    if !value.is_finite() {
        return Err(format!("Energy usage {} is not a finite number", value));
    }
    if value < 0.0 {
        return Err(format!("Energy usage {} kW is negative", value));
    }
    Ok(value)
}

/// Drops optional climate values that cannot be stored as-is.
///
/// Non-finite values are removed from every field; humidity must also lie
/// within 0-100 %. The power value is never touched here.
pub fn sanitize_climate(reading: &mut Reading) {
    for field in ReadingField::ALL {
        let Some(value) = reading.field(field) else {
            continue;
        };

        if !value.is_finite() {
            warn!("Dropping non-finite {} value {}", field.column(), value);
            reading.set_field(field, None);
        } else if field == ReadingField::Humidity && !(0.0..=100.0).contains(&value) {
            warn!("Dropping humidity {} outside 0-100 %", value);
            reading.set_field(field, None);
        }
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is accepted.
pub fn validate_table_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Table name is empty".to_string());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("Table name '{}' contains unsupported characters", name));
    }
    Ok(())
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<Coordinates, String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Latitude {} out of range (-90 to 90)", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Longitude {} out of range (-180 to 180)", lon));
    }
    Ok(Coordinates { lat, lon })
}
