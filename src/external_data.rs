use crate::data_models::Coordinates;
use crate::errors::WeatherError;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;

/// Current outdoor temperature lookup.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Temperature in °C at `location`.
    async fn current_temperature(&self, location: Coordinates) -> Result<f64, WeatherError>;
}

/// OpenWeatherMap current-weather client.
pub struct OpenWeatherClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_temperature(&self, location: Coordinates) -> Result<f64, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let params = [
            ("lat", location.lat.to_string()),
            ("lon", location.lon.to_string()),
            ("units", "metric".to_string()),
            ("appid", api_key.to_string()),
        ];

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let temperature = extract_temperature(&body)?;
        debug!(
            "Outdoor temperature at ({}, {}): {} °C",
            location.lat, location.lon, temperature
        );
        Ok(temperature)
    }
}

/// Reads `main.temp` from a current-weather response.
pub fn extract_temperature(body: &Value) -> Result<f64, WeatherError> {
    body.pointer("/main/temp")
        .and_then(Value::as_f64)
        .filter(|t| t.is_finite())
        .ok_or(WeatherError::MissingTemperature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_main_temp() {
        let body = json!({
            "weather": [{"main": "Clouds"}],
            "main": {"temp": 6.42, "humidity": 87},
            "name": "Aarhus"
        });
        assert_eq!(extract_temperature(&body).unwrap(), 6.42);
    }

    #[test]
    fn test_missing_or_non_numeric_temp_is_malformed() {
        assert!(matches!(
            extract_temperature(&json!({"main": {}})),
            Err(WeatherError::MissingTemperature)
        ));
        assert!(matches!(
            extract_temperature(&json!({"main": {"temp": "warm"}})),
            Err(WeatherError::MissingTemperature)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let client = OpenWeatherClient::new(
            "http://127.0.0.1:9/unreachable",
            Some("  ".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(!client.has_api_key());
        let result = client
            .current_temperature(Coordinates { lat: 56.15, lon: 10.2 })
            .await;
        assert!(matches!(result, Err(WeatherError::MissingApiKey)));
    }
}
