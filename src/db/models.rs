//! Database row types matching `migrations/0001_init.sql`.
//! Used by sqlx for typed queries.

use chrono::{DateTime, Utc};

use crate::types::{RawReading, Sensor, Station, ValidationDecision};

#[derive(Debug, sqlx::FromRow)]
pub struct StationRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SensorRow {
    pub id: i64,
    pub station_id: i64,
    pub parameter: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReadingRow {
    pub id: i64,
    pub sensor_id: i64,
    pub station_id: i64,
    pub parameter: String,
    pub value: f64,
    /// Epoch milliseconds.
    pub recorded_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DecisionRow {
    pub raw_reading_id: i64,
    pub is_valid: bool,
    pub justification: String,
    pub operator_id: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl From<StationRow> for Station {
    fn from(r: StationRow) -> Self {
        Station { id: r.id, name: r.name }
    }
}

impl From<SensorRow> for Sensor {
    fn from(r: SensorRow) -> Self {
        Sensor {
            id: r.id,
            station_id: r.station_id,
            parameter: r.parameter,
        }
    }
}

impl ReadingRow {
    /// None when `recorded_at` is outside chrono's representable range.
    pub fn into_reading(self) -> Option<RawReading> {
        Some(RawReading {
            timestamp: DateTime::<Utc>::from_timestamp_millis(self.recorded_at)?,
            id: self.id,
            sensor_id: self.sensor_id,
            station_id: self.station_id,
            parameter: self.parameter,
            value: self.value,
        })
    }
}

impl DecisionRow {
    pub fn into_decision(self) -> Option<ValidationDecision> {
        Some(ValidationDecision {
            created_at: DateTime::<Utc>::from_timestamp_millis(self.created_at)?,
            raw_reading_id: self.raw_reading_id,
            is_valid: self.is_valid,
            justification: self.justification,
            operator_id: self.operator_id,
        })
    }
}
