use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, warn};

use crate::db::models::{DecisionRow, ReadingRow, SensorRow, StationRow};
use crate::error::StoreResult;
use crate::normalizer::normalize_parameter;
use crate::store::ReadingStore;
use crate::types::{RawReading, Sensor, Station, TimeRange, ValidationDecision};

/// SQLite caps bound parameters per statement; decision lookups are chunked below it.
const DECISION_CHUNK_SIZE: usize = 500;

/// `ReadingStore` over the tables in `migrations/`. Read-only apart from
/// running migrations.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!("SQLite store opened at {db_path}");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn readings_from_rows(rows: Vec<ReadingRow>) -> Vec<RawReading> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            let reading = row.into_reading();
            if reading.is_none() {
                warn!(raw_reading_id = id, "Skipping reading with out-of-range timestamp");
            }
            reading
        })
        .collect()
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn find_station_by_name(&self, name: &str) -> StoreResult<Option<Station>> {
        let row = sqlx::query_as::<_, StationRow>(
            "SELECT id, name FROM stations WHERE name = ? ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Station::from))
    }

    async fn find_sensor(
        &self,
        station_id: i64,
        parameter_key: &str,
    ) -> StoreResult<Option<Sensor>> {
        // Labels are free-form in the table, so the canonical match happens here.
        let rows = sqlx::query_as::<_, SensorRow>(
            "SELECT id, station_id, parameter FROM sensors WHERE station_id = ? ORDER BY id",
        )
        .bind(station_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .find(|r| normalize_parameter(&r.parameter) == parameter_key)
            .map(Sensor::from))
    }

    async fn query_readings(
        &self,
        sensor_id: i64,
        range: &TimeRange,
        limit: usize,
    ) -> StoreResult<Vec<RawReading>> {
        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, sensor_id, station_id, parameter, value, recorded_at
            FROM raw_readings
            WHERE sensor_id = ? AND recorded_at >= ? AND recorded_at < ?
            ORDER BY recorded_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(sensor_id)
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(readings_from_rows(rows))
    }

    async fn query_decisions(
        &self,
        raw_reading_ids: &[i64],
    ) -> StoreResult<HashMap<i64, ValidationDecision>> {
        let mut out = HashMap::with_capacity(raw_reading_ids.len());

        for chunk in raw_reading_ids.chunks(DECISION_CHUNK_SIZE) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT raw_reading_id, is_valid, justification, operator_id, created_at \
                 FROM validation_decisions WHERE raw_reading_id IN (",
            );
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(") ORDER BY created_at ASC, id ASC");

            let rows: Vec<DecisionRow> = qb.build_query_as().fetch_all(&self.pool).await?;

            // Ascending order: later decisions overwrite earlier ones.
            for decision in rows.into_iter().filter_map(DecisionRow::into_decision) {
                out.insert(decision.raw_reading_id, decision);
            }
        }

        Ok(out)
    }

    async fn latest_reading(
        &self,
        sensor_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<RawReading>> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT id, sensor_id, station_id, parameter, value, recorded_at
            FROM raw_readings
            WHERE sensor_id = ? AND recorded_at >= ? AND recorded_at < ?
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_id)
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(ReadingRow::into_reading))
    }

    async fn latest_index_value(
        &self,
        station_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<f64>> {
        let value = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT value FROM index_results
            WHERE station_id = ? AND computed_at >= ? AND computed_at < ?
            ORDER BY computed_at DESC
            LIMIT 1
            "#,
        )
        .bind(station_id)
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn availability_percentage(
        &self,
        station_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<f64>> {
        let value = sqlx::query_scalar::<_, f64>(
            "SELECT percentage FROM station_availability WHERE station_id = ? AND day = ?",
        )
        .bind(station_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
