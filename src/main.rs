use anyhow::{Context, Result};
use clap::Parser;
use energy_pipeline::aggregator::Aggregator;
use energy_pipeline::api::{create_router, AppState};
use energy_pipeline::broker::MqttSession;
use energy_pipeline::config::Settings;
use energy_pipeline::db::create_pool;
use energy_pipeline::db_operations::{PgReadingStore, ReadingStore, StoreWriter};
use energy_pipeline::enricher::{Enricher, LastKnownLocation};
use energy_pipeline::external_data::OpenWeatherClient;
use energy_pipeline::metrics::METRICS;
use energy_pipeline::parsers::power_payload::PayloadNormalizer;
use energy_pipeline::retry::{bootstrap_retry_config, retry_with_backoff};
use energy_pipeline::subscriber::Subscriber;
use log::{error, info};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::parse();
    settings.validate()?;
    Lazy::force(&METRICS);

    info!("Starting energy pipeline");

    // Store
    let pool = create_pool(
        &settings.database_url,
        settings.db_pool_size,
        settings.pool_timeouts(),
    )?;
    let pg_store = Arc::new(PgReadingStore::new(pool, &settings.readings_table)?);
    retry_with_backoff(&bootstrap_retry_config(), "ensure_table", || {
        pg_store.ensure_table()
    })
    .await
    .context("Readings table could not be prepared")?;

    let store: Arc<dyn ReadingStore> = pg_store;
    let writer = StoreWriter::new(store.clone());

    // Ingestion
    let subscriber = Subscriber::new(
        MqttSession::new(&settings),
        settings.topic_pattern.clone(),
        PayloadNormalizer::new(settings.meter_topic_marker.clone()),
        writer.clone(),
    )
    .start();
    info!(
        "Subscribing to '{}' on {}:{}",
        settings.topic_pattern, settings.mqtt_host, settings.mqtt_port
    );

    // Enrichment
    let weather = Arc::new(OpenWeatherClient::new(
        settings.weather_base_url.clone(),
        settings.weather_api_key.clone(),
        Duration::from_secs(settings.weather_timeout_secs),
    )?);
    let last_known = LastKnownLocation::new();

    let enricher = if weather.has_api_key() {
        Some(
            Enricher::new(
                weather.clone(),
                writer,
                settings.default_location()?,
                last_known.clone(),
                settings.enrichment_interval(),
            )
            .start(),
        )
    } else {
        error!("OWM_API_KEY is not set; outdoor temperature enrichment is disabled");
        None
    };

    // Read API
    let state = AppState {
        aggregator: Aggregator::new(store),
        weather,
        last_known,
        historical_window: settings.historical_window(),
    };
    let listener = TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", settings.http_addr))?;
    info!("HTTP read API listening on {}", settings.http_addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    subscriber.stop().await?;
    if let Some(enricher) = enricher {
        enricher.stop().await?;
    }
    let _ = shutdown_tx.send(true);
    server.await??;

    METRICS.lock().log_summary();
    info!("Energy pipeline stopped");
    Ok(())
}
