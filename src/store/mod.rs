pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreResult;
use crate::types::{RawReading, Sensor, Station, TimeRange, ValidationDecision};

/// Read access to stations, sensors, readings and analyst decisions.
///
/// Injected into every service as `Arc<dyn ReadingStore>`; the core never
/// writes through it.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Exact name match.
    async fn find_station_by_name(&self, name: &str) -> StoreResult<Option<Station>>;

    /// Sensor of `station_id` whose registered label normalizes to `parameter_key`.
    async fn find_sensor(
        &self,
        station_id: i64,
        parameter_key: &str,
    ) -> StoreResult<Option<Sensor>>;

    /// Readings in `range`, ascending by timestamp, at most `limit`.
    async fn query_readings(
        &self,
        sensor_id: i64,
        range: &TimeRange,
        limit: usize,
    ) -> StoreResult<Vec<RawReading>>;

    /// Decisions keyed by raw reading id. When a reading carries several
    /// decisions the most recent one wins.
    async fn query_decisions(
        &self,
        raw_reading_ids: &[i64],
    ) -> StoreResult<HashMap<i64, ValidationDecision>>;

    /// Most recent reading of a sensor in `range`.
    async fn latest_reading(
        &self,
        sensor_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<RawReading>>;

    /// Most recent index result of a station in `range`.
    async fn latest_index_value(
        &self,
        station_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<f64>>;

    async fn availability_percentage(
        &self,
        station_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<f64>>;
}
