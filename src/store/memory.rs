use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

use crate::error::{StoreError, StoreResult};
use crate::normalizer::normalize_parameter;
use crate::store::ReadingStore;
use crate::types::{RawReading, Sensor, Station, TimeRange, ValidationDecision};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Backs `STORE_BACKEND=memory` and stands in for the
/// database in service tests.
pub struct MemoryStore {
    /// station_id → Station
    stations: DashMap<i64, Station>,
    /// sensor_id → Sensor
    sensors: DashMap<i64, Sensor>,
    /// sensor_id → readings, kept sorted ascending by timestamp
    readings: DashMap<i64, Vec<RawReading>>,
    /// raw_reading_id → every decision recorded for it
    decisions: DashMap<i64, Vec<ValidationDecision>>,
    /// station_id → (computed_at, index value)
    index_results: DashMap<i64, Vec<(DateTime<Utc>, f64)>>,
    /// (station_id, local date) → availability percentage
    availability: DashMap<(i64, NaiveDate), f64>,
    /// When set every query fails with `StoreError::Unavailable`.
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Loading helpers for service tests; the service itself never writes.
#[cfg(test)]
impl MemoryStore {
    pub fn add_station(&self, station: Station) {
        self.stations.insert(station.id, station);
    }

    pub fn add_sensor(&self, sensor: Sensor) {
        self.sensors.insert(sensor.id, sensor);
    }

    pub fn add_reading(&self, reading: RawReading) {
        let mut series = self.readings.entry(reading.sensor_id).or_default();
        let at = series.partition_point(|r| r.timestamp <= reading.timestamp);
        series.insert(at, reading);
    }

    pub fn add_readings(&self, readings: Vec<RawReading>) {
        for reading in readings {
            self.add_reading(reading);
        }
    }

    pub fn add_decision(&self, decision: ValidationDecision) {
        self.decisions
            .entry(decision.raw_reading_id)
            .or_default()
            .push(decision);
    }

    pub fn add_index_result(&self, station_id: i64, computed_at: DateTime<Utc>, value: f64) {
        self.index_results
            .entry(station_id)
            .or_default()
            .push((computed_at, value));
    }

    pub fn set_availability(&self, station_id: i64, date: NaiveDate, percentage: f64) {
        self.availability.insert((station_id, date), percentage);
    }

    pub fn set_unavailable(&self, v: bool) {
        self.unavailable.store(v, Ordering::Relaxed);
    }

    pub fn reading_count(&self) -> usize {
        self.readings.iter().map(|e| e.value().len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            stations: DashMap::new(),
            sensors: DashMap::new(),
            readings: DashMap::new(),
            decisions: DashMap::new(),
            index_results: DashMap::new(),
            availability: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn find_station_by_name(&self, name: &str) -> StoreResult<Option<Station>> {
        self.check_available()?;
        Ok(self
            .stations
            .iter()
            .filter(|e| e.value().name == name)
            .min_by_key(|e| *e.key())
            .map(|e| e.value().clone()))
    }

    async fn find_sensor(
        &self,
        station_id: i64,
        parameter_key: &str,
    ) -> StoreResult<Option<Sensor>> {
        self.check_available()?;
        Ok(self
            .sensors
            .iter()
            .filter(|e| {
                let s = e.value();
                s.station_id == station_id && normalize_parameter(&s.parameter) == parameter_key
            })
            .min_by_key(|e| *e.key())
            .map(|e| e.value().clone()))
    }

    async fn query_readings(
        &self,
        sensor_id: i64,
        range: &TimeRange,
        limit: usize,
    ) -> StoreResult<Vec<RawReading>> {
        self.check_available()?;
        let Some(series) = self.readings.get(&sensor_id) else {
            return Ok(Vec::new());
        };
        Ok(series
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_decisions(
        &self,
        raw_reading_ids: &[i64],
    ) -> StoreResult<HashMap<i64, ValidationDecision>> {
        self.check_available()?;
        let mut out = HashMap::new();
        for id in raw_reading_ids {
            if let Some(list) = self.decisions.get(id) {
                // max_by_key keeps the last of equal maxima, so later inserts win ties.
                if let Some(latest) = list.iter().max_by_key(|d| d.created_at) {
                    out.insert(*id, latest.clone());
                }
            }
        }
        Ok(out)
    }

    async fn latest_reading(
        &self,
        sensor_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<RawReading>> {
        self.check_available()?;
        let Some(series) = self.readings.get(&sensor_id) else {
            return Ok(None);
        };
        Ok(series
            .iter()
            .rev()
            .find(|r| range.contains(r.timestamp))
            .cloned())
    }

    async fn latest_index_value(
        &self,
        station_id: i64,
        range: &TimeRange,
    ) -> StoreResult<Option<f64>> {
        self.check_available()?;
        let Some(results) = self.index_results.get(&station_id) else {
            return Ok(None);
        };
        Ok(results
            .iter()
            .filter(|(at, _)| range.contains(*at))
            .max_by_key(|(at, _)| *at)
            .map(|(_, value)| *value))
    }

    async fn availability_percentage(
        &self,
        station_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<f64>> {
        self.check_available()?;
        Ok(self.availability.get(&(station_id, date)).map(|v| *v))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
