use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("Invalid table name '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidTableName(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database pool creation error: {0}")]
    DbPoolError(String),
    #[error("Database operation failed: {0}")]
    DbQueryError(#[from] tokio_postgres::Error),
    #[error("Failed to get database connection from pool: {0}")]
    DbConnectionError(#[from] deadpool_postgres::PoolError),
}

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Weather API key is not configured")]
    MissingApiKey,
    #[error("Weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Weather API responded with HTTP {status}")]
    Status { status: u16 },
    #[error("Weather response has no 'main.temp' field")]
    MissingTemperature,
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Why an inbound message did not become a reading.
///
/// Every variant except `IgnoredTopic` keeps the raw payload bytes so a
/// rejected message can be inspected from the logs.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("Topic '{topic}' is not a meter topic")]
    IgnoredTopic { topic: String },
    #[error("Payload on '{}' is not valid JSON: {}; raw: {}", .topic, .source, String::from_utf8_lossy(.raw))]
    InvalidPayload {
        topic: String,
        raw: Vec<u8>,
        #[source]
        source: serde_json::Error,
    },
    #[error("No numeric power value in payload on '{}'; raw: {}", .topic, String::from_utf8_lossy(.raw))]
    NoPowerValue { topic: String, raw: Vec<u8> },
    #[error("Energy usage {} on '{}' is not a non-negative number; raw: {}", .value, .topic, String::from_utf8_lossy(.raw))]
    InvalidEnergyUsage {
        topic: String,
        value: f64,
        raw: Vec<u8>,
    },
}

impl Rejection {
    pub fn raw_payload(&self) -> Option<&[u8]> {
        match self {
            Rejection::IgnoredTopic { .. } => None,
            Rejection::InvalidPayload { raw, .. }
            | Rejection::NoPowerValue { raw, .. }
            | Rejection::InvalidEnergyUsage { raw, .. } => Some(raw),
        }
    }
}

/// Failure reported when a background task is stopped or joined.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
