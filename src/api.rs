use crate::aggregator::Aggregator;
use crate::enricher::LastKnownLocation;
use crate::errors::{StoreError, WeatherError};
use crate::external_data::WeatherProvider;
use crate::validation::validate_coordinates;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub weather: Arc<dyn WeatherProvider>,
    pub last_known: LastKnownLocation,
    pub historical_window: chrono::Duration,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Weather lookup failed: {0}")]
    WeatherUnavailable(#[from] WeatherError),

    #[error("Store read failed: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::WeatherUnavailable(e) => {
                (StatusCode::BAD_GATEWAY, e.to_string(), "WEATHER_UNAVAILABLE")
            }
            AppError::Store(e) => {
                error!("Read request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read from the store".to_string(),
                    "STORE_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalResponse {
    pub average_performance: f64,
    pub sample_count: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTemperatureResponse {
    pub external_temperature: f64,
}

/// Raw query strings so malformed numbers get the same JSON error body.
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/latest", get(latest))
        .route("/historical", get(historical))
        .route("/external-temperature", get(external_temperature))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn latest(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let body = match state.aggregator.latest().await? {
        Some(reading) => json!(reading),
        None => json!({}),
    };
    Ok(Json(body))
}

async fn historical(State(state): State<AppState>) -> Result<Json<HistoricalResponse>, AppError> {
    let window = state.aggregator.average(state.historical_window).await?;

    Ok(Json(HistoricalResponse {
        average_performance: window.average,
        sample_count: window.sample_count,
        window_start: window.window_start,
        window_end: window.window_end,
    }))
}

async fn external_temperature(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<Json<ExternalTemperatureResponse>, AppError> {
    let (Some(lat), Some(lon)) = (query.lat.as_deref(), query.lon.as_deref()) else {
        return Err(AppError::BadRequest(
            "Latitude and longitude are required".to_string(),
        ));
    };

    let parse = |name: &str, raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|_| AppError::BadRequest(format!("{} '{}' is not a number", name, raw)))
    };
    let location = validate_coordinates(parse("Latitude", lat)?, parse("Longitude", lon)?)
        .map_err(AppError::BadRequest)?;

    let temperature = state.weather.current_temperature(location).await?;
    state.last_known.report(location);

    Ok(Json(ExternalTemperatureResponse {
        external_temperature: temperature,
    }))
}
