use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::api::health::HealthState;
use crate::config::{unit_for, DISPLAY_DATETIME_FORMAT};
use crate::error::{ServiceError, StoreError};
use crate::normalizer::normalize_parameter;
use crate::store::ReadingStore;
use crate::types::{
    ClassifiedRow, RawReading, ReadingStatus, ReadingWindow, TimeRange, ValidationDecision,
};

/// How a reading with no analyst decision is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Undecided readings count as valid.
    ValidByDefault,
    /// Undecided readings younger than `window` are pending; older ones are valid.
    AwaitReview { window: Duration },
}

impl PendingPolicy {
    fn undecided_status(self, recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> ReadingStatus {
        match self {
            PendingPolicy::ValidByDefault => ReadingStatus::Valid,
            // A window reaching past the representable range covers every reading.
            PendingPolicy::AwaitReview { window } => match now.checked_sub_signed(window) {
                Some(cutoff) if recorded_at <= cutoff => ReadingStatus::Valid,
                _ => ReadingStatus::Pending,
            },
        }
    }
}

/// Merges raw readings with analyst decisions into display rows.
pub struct ConsistencyService {
    store: Arc<dyn ReadingStore>,
    health: Arc<HealthState>,
    timezone: Tz,
    pending_policy: PendingPolicy,
}

impl ConsistencyService {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        health: Arc<HealthState>,
        timezone: Tz,
        pending_policy: PendingPolicy,
    ) -> Self {
        Self {
            store,
            health,
            timezone,
            pending_policy,
        }
    }

    /// Classified rows of one station parameter, ascending by time with ids
    /// `1..=N`. Unknown stations/sensors and store failures yield `[]`.
    pub async fn reconcile(
        &self,
        station: &str,
        parameter: &str,
        window: ReadingWindow,
    ) -> Vec<ClassifiedRow> {
        self.reconcile_at(station, parameter, window, Utc::now()).await
    }

    pub async fn reconcile_at(
        &self,
        station: &str,
        parameter: &str,
        window: ReadingWindow,
        now: DateTime<Utc>,
    ) -> Vec<ClassifiedRow> {
        match self.try_reconcile(station, parameter, window, now).await {
            Ok(rows) => rows,
            Err(e) => {
                self.health.record_failure("reconcile", &e);
                Vec::new()
            }
        }
    }

    async fn try_reconcile(
        &self,
        station_name: &str,
        parameter: &str,
        window: ReadingWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassifiedRow>, ServiceError> {
        let key = normalize_parameter(parameter);

        let station = self
            .store
            .find_station_by_name(station_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("station '{station_name}'")))?;

        let sensor = self
            .store
            .find_sensor(station.id, &key)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("sensor '{key}' at station '{station_name}'"))
            })?;

        let (range, limit) = window.resolve(now);
        let rows = self.sensor_rows(sensor.id, &key, &range, limit, now).await?;

        debug!(
            station = %station_name,
            parameter = %key,
            rows = rows.len(),
            "Reconciled readings"
        );
        Ok(rows)
    }

    /// Reconcile one sensor's readings in `range`. Store errors propagate.
    pub async fn sensor_rows(
        &self,
        sensor_id: i64,
        parameter_key: &str,
        range: &TimeRange,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassifiedRow>, StoreError> {
        let mut readings = self.store.query_readings(sensor_id, range, limit).await?;
        readings.sort_by_key(|r| r.timestamp);

        let decisions = if readings.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<i64> = readings.iter().map(|r| r.id).collect();
            self.store.query_decisions(&ids).await?
        };

        let unit = unit_for(parameter_key);
        Ok(readings
            .iter()
            .enumerate()
            .map(|(i, reading)| {
                self.classify(i + 1, reading, decisions.get(&reading.id), unit, now)
            })
            .collect())
    }

    /// Most recent reading in `range` that no analyst has invalidated.
    /// Walks back from the newest reading past any invalidated ones.
    pub async fn latest_accepted_reading(
        &self,
        sensor_id: i64,
        range: &TimeRange,
    ) -> Result<Option<RawReading>, StoreError> {
        let mut search = *range;
        while let Some(reading) = self.store.latest_reading(sensor_id, &search).await? {
            let decisions = self.store.query_decisions(&[reading.id]).await?;
            match decisions.get(&reading.id) {
                Some(d) if !d.is_valid => {
                    debug!(raw_reading_id = reading.id, "Skipping invalidated reading");
                    search = TimeRange::new(search.start, reading.timestamp);
                }
                _ => return Ok(Some(reading)),
            }
        }
        Ok(None)
    }

    fn classify(
        &self,
        sequence_id: usize,
        reading: &RawReading,
        decision: Option<&ValidationDecision>,
        unit: &str,
        now: DateTime<Utc>,
    ) -> ClassifiedRow {
        let status = match decision {
            Some(d) if d.is_valid => ReadingStatus::Valid,
            Some(_) => ReadingStatus::Invalid,
            None => self.pending_policy.undecided_status(reading.timestamp, now),
        };

        let raw_value = format!("{:.1}", reading.value);
        let final_value = if status == ReadingStatus::Invalid {
            "-".to_string()
        } else {
            raw_value.clone()
        };

        ClassifiedRow {
            sequence_id,
            date_time: reading
                .timestamp
                .with_timezone(&self.timezone)
                .format(DISPLAY_DATETIME_FORMAT)
                .to_string(),
            raw_value,
            final_value,
            unit: unit.to_string(),
            status,
            justification: decision.map(|d| d.justification.clone()).unwrap_or_default(),
            operator: decision.map(|d| d.operator_id.clone()).unwrap_or_default(),
            raw_data_id: Some(reading.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
