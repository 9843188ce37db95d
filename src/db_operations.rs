use crate::data_models::{Reading, ReadingField, READING_COLUMNS};
use crate::db::DbPool;
use crate::errors::{ConfigError, StoreError};
use crate::metrics::METRICS;
use crate::validation::validate_table_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// The persistent store as seen by the pipeline.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError>;

    /// The row that sorts last by timestamp, if any.
    async fn select_latest(&self) -> Result<Option<Reading>, StoreError>;

    /// All rows with `timestamp >= since`, oldest first.
    async fn select_since(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError>;

    /// Sets one column on the row that sorts last by timestamp.
    ///
    /// Returns `false` when the store is empty and nothing was updated.
    async fn update_latest_field(&self, field: ReadingField, value: f64)
        -> Result<bool, StoreError>;
}

/// SQL text for one readings table, built once from the validated name.
#[derive(Debug, Clone)]
pub struct ReadingQueries {
    table: String,
    insert: String,
    select_latest: String,
    select_since: String,
}

impl ReadingQueries {
    pub fn new(table_name: &str) -> Result<Self, ConfigError> {
        validate_table_name(table_name)
            .map_err(|_| ConfigError::InvalidTableName(table_name.to_string()))?;

        let table = format!("\"{}\"", table_name);
        let columns = READING_COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=READING_COLUMNS.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            insert: format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
            select_latest: format!(
                "SELECT {} FROM {} ORDER BY \"timestamp\" DESC LIMIT 1",
                columns, table
            ),
            select_since: format!(
                "SELECT {} FROM {} WHERE \"timestamp\" >= $1 ORDER BY \"timestamp\" ASC",
                columns, table
            ),
            table,
        })
    }

    pub fn update_latest(&self, field: ReadingField) -> String {
        format!(
            "UPDATE {table} SET \"{column}\" = $1 \
             WHERE ctid = (SELECT ctid FROM {table} ORDER BY \"timestamp\" DESC LIMIT 1)",
            table = self.table,
            column = field.column()
        )
    }

    pub fn create_table(&self) -> String {
        let index_name = format!("\"idx_{}_timestamp\"", self.table.trim_matches('"'));
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                "timestamp" TIMESTAMPTZ NOT NULL,
                energy_usage DOUBLE PRECISION NOT NULL,
                temperature_inside DOUBLE PRECISION,
                temperature_outside DOUBLE PRECISION,
                humidity DOUBLE PRECISION,
                voc_level DOUBLE PRECISION,
                pm25_level DOUBLE PRECISION
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table} ("timestamp" DESC);
            "#,
            table = self.table,
            index = index_name
        )
    }
}

/// PostgreSQL-backed reading store.
pub struct PgReadingStore {
    pool: DbPool,
    queries: ReadingQueries,
}

impl PgReadingStore {
    pub fn new(pool: DbPool, table_name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            pool,
            queries: ReadingQueries::new(table_name)?,
        })
    }

    /// Creates the readings table and its timestamp index when missing.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.batch_execute(&self.queries.create_table()).await?;
        info!("Readings table {} is ready", self.queries.table);
        Ok(())
    }
}

fn reading_from_row(row: &Row) -> Result<Reading, StoreError> {
    Ok(Reading {
        timestamp: row.try_get("timestamp")?,
        energy_usage: row.try_get("energy_usage")?,
        temperature_inside: row.try_get("temperature_inside")?,
        temperature_outside: row.try_get("temperature_outside")?,
        humidity: row.try_get("humidity")?,
        voc_level: row.try_get("voc_level")?,
        pm25_level: row.try_get("pm25_level")?,
    })
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let params: [&(dyn ToSql + Sync); 7] = [
            &reading.timestamp,
            &reading.energy_usage,
            &reading.temperature_inside,
            &reading.temperature_outside,
            &reading.humidity,
            &reading.voc_level,
            &reading.pm25_level,
        ];
        client.execute(self.queries.insert.as_str(), &params).await?;
        Ok(())
    }

    async fn select_latest(&self) -> Result<Option<Reading>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(self.queries.select_latest.as_str(), &[])
            .await?;
        row.as_ref().map(reading_from_row).transpose()
    }

    async fn select_since(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(self.queries.select_since.as_str(), &[&since])
            .await?;
        rows.iter().map(reading_from_row).collect()
    }

    async fn update_latest_field(
        &self,
        field: ReadingField,
        value: f64,
    ) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(self.queries.update_latest(field).as_str(), &[&value])
            .await?;
        Ok(updated > 0)
    }
}

/// Write side of the pipeline: appends new readings and applies the
/// enrichment patch. Failures are reported to the caller and never retried.
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn ReadingStore>,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        match self.store.insert(reading).await {
            Ok(()) => {
                METRICS.lock().record_stored();
                info!(
                    "Stored reading: {:.3} kW at {}",
                    reading.energy_usage, reading.timestamp
                );
                Ok(())
            }
            Err(e) => {
                METRICS.lock().record_store_failure();
                Err(e)
            }
        }
    }

    pub async fn patch_latest(&self, field: ReadingField, value: f64) -> Result<bool, StoreError> {
        let updated = self.store.update_latest_field(field, value).await?;
        if updated {
            debug!("Patched {} = {} on latest reading", field.column(), value);
        }
        Ok(updated)
    }
}
