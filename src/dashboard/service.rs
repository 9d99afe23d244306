use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::config::{
    unit_for, DIRECTIONAL_ROW_LIMIT, PARAMETER_THRESHOLDS, RANGE_ROW_LIMIT, WIND_DIRECTION_KEY,
    WIND_SPEED_KEY,
};
use crate::consistency::{bucket_means, ConsistencyService};
use crate::dashboard::classifier::{
    classify_index, classify_parameter, IndexColor, IndexQuality, ParameterStatus,
};
use crate::dashboard::directional::{compute_roses, DirectionalSeries, PollutantSample, WindSample};
use crate::error::{ServiceError, StoreError};
use crate::store::ReadingStore;
use crate::types::{RawReading, Station, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AirQualityIndex {
    pub value: i32,
    pub quality: IndexQuality,
    pub color: IndexColor,
}

impl AirQualityIndex {
    pub fn not_available() -> Self {
        Self {
            value: 0,
            quality: IndexQuality::NotAvailable,
            color: IndexColor::Gray,
        }
    }

    pub fn from_value(raw: f64) -> Self {
        let value = raw.round() as i32;
        let band = classify_index(value);
        Self {
            value,
            quality: band.quality,
            color: band.color,
        }
    }
}

/// Latest non-invalidated reading of one thresholded parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub status: ParameterStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyPoint {
    pub hour: u32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub availability: f64,
    pub index: AirQualityIndex,
    pub wind_series: Vec<WindSample>,
    pub pollutant_series: Vec<PollutantSample>,
    pub parameter_statuses: Vec<ParameterSnapshot>,
    pub hourly_timeline: Vec<HourlyPoint>,
}

fn zero_timeline() -> Vec<HourlyPoint> {
    (0..24).map(|hour| HourlyPoint { hour, value: 0.0 }).collect()
}

impl Dashboard {
    /// What callers see for an unknown station or an unreachable store.
    pub fn empty() -> Self {
        let roses = DirectionalSeries::zeroed();
        Self {
            availability: 0.0,
            index: AirQualityIndex::not_available(),
            wind_series: roses.wind,
            pollutant_series: roses.pollutant,
            parameter_statuses: Vec::new(),
            hourly_timeline: zero_timeline(),
        }
    }
}

/// Per-station, per-day summary: availability, index, roses, parameter
/// alerts and an hourly pollutant timeline.
pub struct DashboardService {
    store: Arc<dyn ReadingStore>,
    consistency: Arc<ConsistencyService>,
    health: Arc<HealthState>,
    timezone: Tz,
    pollutant_key: String,
}

impl DashboardService {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        consistency: Arc<ConsistencyService>,
        health: Arc<HealthState>,
        timezone: Tz,
        pollutant_key: String,
    ) -> Self {
        Self {
            store,
            consistency,
            health,
            timezone,
            pollutant_key,
        }
    }

    /// Current local date in the station timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub async fn compute_dashboard(&self, station_name: &str, date: NaiveDate) -> Dashboard {
        let station = match self.store.find_station_by_name(station_name).await {
            Ok(Some(station)) => station,
            Ok(None) => {
                let err = ServiceError::NotFound(format!("station '{station_name}'"));
                self.health.record_failure("dashboard", &err);
                return Dashboard::empty();
            }
            Err(e) => {
                self.health.record_store_error("dashboard", &e);
                return Dashboard::empty();
            }
        };

        let day = TimeRange::local_day(date, self.timezone);

        let availability = self
            .availability(&station, date)
            .await
            .unwrap_or_else(|e| self.soft("dashboard.availability", e, 0.0));
        let index = self
            .index(&station, &day)
            .await
            .unwrap_or_else(|e| self.soft("dashboard.index", e, AirQualityIndex::not_available()));
        let roses = self
            .roses(&station, &day)
            .await
            .unwrap_or_else(|e| self.soft("dashboard.roses", e, DirectionalSeries::zeroed()));
        let parameter_statuses = self.parameter_statuses(&station, &day).await;
        let hourly_timeline = self
            .hourly_timeline(&station, date, &day)
            .await
            .unwrap_or_else(|e| self.soft("dashboard.timeline", e, zero_timeline()));

        info!(
            station = %station.name,
            %date,
            index = index.value,
            quality = %index.quality,
            alerts = parameter_statuses
                .iter()
                .filter(|p| p.status != ParameterStatus::Normal)
                .count(),
            "Dashboard computed"
        );

        Dashboard {
            availability,
            index,
            wind_series: roses.wind,
            pollutant_series: roses.pollutant,
            parameter_statuses,
            hourly_timeline,
        }
    }

    fn soft<T>(&self, operation: &str, err: StoreError, fallback: T) -> T {
        self.health.record_store_error(operation, &err);
        fallback
    }

    async fn availability(&self, station: &Station, date: NaiveDate) -> Result<f64, StoreError> {
        Ok(self
            .store
            .availability_percentage(station.id, date)
            .await?
            .unwrap_or(0.0))
    }

    async fn index(
        &self,
        station: &Station,
        day: &TimeRange,
    ) -> Result<AirQualityIndex, StoreError> {
        Ok(self
            .store
            .latest_index_value(station.id, day)
            .await?
            .map(AirQualityIndex::from_value)
            .unwrap_or_else(AirQualityIndex::not_available))
    }

    /// Day's readings of the sensor measuring `key`; empty when the station
    /// has no such sensor.
    async fn day_readings(
        &self,
        station: &Station,
        key: &str,
        day: &TimeRange,
    ) -> Result<Vec<RawReading>, StoreError> {
        match self.store.find_sensor(station.id, key).await? {
            Some(sensor) => {
                self.store
                    .query_readings(sensor.id, day, DIRECTIONAL_ROW_LIMIT)
                    .await
            }
            None => {
                debug!(station = %station.name, parameter = key, "No sensor, contributing zeros");
                Ok(Vec::new())
            }
        }
    }

    async fn roses(
        &self,
        station: &Station,
        day: &TimeRange,
    ) -> Result<DirectionalSeries, StoreError> {
        let (directions, speeds, pollutant) = tokio::try_join!(
            self.day_readings(station, WIND_DIRECTION_KEY, day),
            self.day_readings(station, WIND_SPEED_KEY, day),
            self.day_readings(station, &self.pollutant_key, day),
        )?;
        Ok(compute_roses(&directions, &speeds, &pollutant))
    }

    async fn parameter_snapshot(
        &self,
        station: &Station,
        key: &'static str,
        day: &TimeRange,
    ) -> Result<Option<ParameterSnapshot>, StoreError> {
        let Some(sensor) = self.store.find_sensor(station.id, key).await? else {
            return Ok(None);
        };
        let Some(latest) = self.consistency.latest_accepted_reading(sensor.id, day).await? else {
            return Ok(None);
        };
        Ok(Some(ParameterSnapshot {
            parameter: key.to_string(),
            value: latest.value,
            unit: unit_for(key).to_string(),
            status: classify_parameter(key, latest.value),
        }))
    }

    /// Snapshots in threshold-table order. Lookups run concurrently; a failed
    /// lookup drops only its own parameter.
    async fn parameter_statuses(
        &self,
        station: &Station,
        day: &TimeRange,
    ) -> Vec<ParameterSnapshot> {
        let lookups = PARAMETER_THRESHOLDS
            .iter()
            .map(|&(key, _, _)| self.parameter_snapshot(station, key, day));

        let mut out = Vec::new();
        for result in join_all(lookups).await {
            match result {
                Ok(Some(snapshot)) => out.push(snapshot),
                Ok(None) => {}
                Err(e) => self.health.record_store_error("dashboard.parameter_status", &e),
            }
        }
        out
    }

    /// Hourly means of the reconciled pollutant readings for the local day.
    async fn hourly_timeline(
        &self,
        station: &Station,
        date: NaiveDate,
        day: &TimeRange,
    ) -> Result<Vec<HourlyPoint>, StoreError> {
        let mut timeline = zero_timeline();
        let Some(sensor) = self.store.find_sensor(station.id, &self.pollutant_key).await? else {
            return Ok(timeline);
        };

        let rows = self
            .consistency
            .sensor_rows(sensor.id, &self.pollutant_key, day, RANGE_ROW_LIMIT, Utc::now())
            .await?;

        for bucket in bucket_means(&rows, 60) {
            if bucket.date != date {
                continue;
            }
            if let Some(point) = timeline.get_mut(bucket.index as usize) {
                point.value = (bucket.mean * 10.0).round() / 10.0;
            }
        }
        Ok(timeline)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::PendingPolicy;
    use crate::store::MemoryStore;
    use crate::types::{Sensor, ValidationDecision};
    use chrono::{DateTime, Duration, TimeZone};

    const STATION: &str = "Unidade SP - Estação 2";

    fn tz() -> Tz {
        "America/Sao_Paulo".parse().unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    /// Local 10/03/2025 00:00 in São Paulo.
    fn local_midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap()
    }

    fn reading(id: i64, sensor_id: i64, minutes: i64, value: f64) -> RawReading {
        RawReading {
            id,
            sensor_id,
            station_id: 1,
            parameter: String::new(),
            value,
            timestamp: local_midnight() + Duration::minutes(minutes),
        }
    }

    fn services(store: Arc<MemoryStore>) -> (DashboardService, Arc<HealthState>) {
        let health = Arc::new(HealthState::new());
        let consistency = Arc::new(ConsistencyService::new(
            store.clone(),
            health.clone(),
            tz(),
            PendingPolicy::ValidByDefault,
        ));
        let svc = DashboardService::new(
            store,
            consistency,
            health.clone(),
            tz(),
            "MP10".to_string(),
        );
        (svc, health)
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.add_station(Station {
            id: 1,
            name: STATION.to_string(),
        });
        let sensors = [
            (1, "DV"),
            (2, "VV"),
            (3, "MP₁₀ (µg/m³)"),
            (4, "CO (mg/m³)"),
            (5, "O₃"),
        ];
        for (id, parameter) in sensors {
            store.add_sensor(Sensor {
                id,
                station_id: 1,
                parameter: parameter.to_string(),
            });
        }
        store
    }

    fn assert_is_empty_dashboard(d: &Dashboard) {
        assert_eq!(d.availability, 0.0);
        assert_eq!(d.index, AirQualityIndex::not_available());
        assert_eq!(d.wind_series.len(), 8);
        assert!(d.wind_series.iter().all(|w| w.velocity == 0.0));
        assert_eq!(d.pollutant_series.len(), 8);
        assert!(d.pollutant_series.iter().all(|p| p.concentration == 0.0));
        assert!(d.parameter_statuses.is_empty());
        assert_eq!(d.hourly_timeline.len(), 24);
        assert!(d.hourly_timeline.iter().all(|h| h.value == 0.0));
    }

    #[tokio::test]
    async fn unknown_station_yields_documented_default() {
        let (svc, health) = services(seeded());
        let d = svc.compute_dashboard("Unidade SP - Estação 1", date()).await;
        assert_is_empty_dashboard(&d);
        assert_eq!(d, Dashboard::empty());
        assert_eq!(health.store_errors(), 0);
    }

    #[tokio::test]
    async fn unreachable_store_yields_default() {
        let store = seeded();
        store.set_unavailable(true);
        let (svc, health) = services(store);
        let d = svc.compute_dashboard(STATION, date()).await;
        assert_is_empty_dashboard(&d);
        assert_eq!(health.store_errors(), 1);
    }

    #[tokio::test]
    async fn station_without_data_is_zero_filled() {
        let (svc, _) = services(seeded());
        let d = svc.compute_dashboard(STATION, date()).await;
        assert_is_empty_dashboard(&d);
    }

    #[tokio::test]
    async fn full_day_dashboard() {
        let store = seeded();
        store.set_availability(1, date(), 95.8);
        store.add_index_result(1, local_midnight() + Duration::hours(1), 40.0);
        store.add_index_result(1, local_midnight() + Duration::hours(9), 120.6);
        // Previous local day; must not leak into this one.
        store.add_index_result(1, local_midnight() - Duration::hours(1), 250.0);

        store.add_readings(vec![
            // wind direction: east at 08:00, south at 08:30
            reading(10, 1, 480, 90.0),
            reading(11, 1, 510, 180.0),
            // wind speed
            reading(20, 2, 481, 3.2),
            reading(21, 2, 509, 5.0),
            // MP10
            reading(30, 3, 479, 60.0),
            reading(31, 3, 500, 80.0),
            reading(32, 3, 512, 130.0),
            reading(33, 3, 540, 500.0),
            // CO
            reading(40, 4, 100, 2.0),
            reading(41, 4, 200, 4.5),
        ]);
        // 09:00 spike invalidated by an analyst.
        store.add_decision(ValidationDecision {
            raw_reading_id: 33,
            is_valid: false,
            justification: "calibration".to_string(),
            operator_id: "analyst-1".to_string(),
            created_at: local_midnight() + Duration::hours(10),
        });

        let (svc, health) = services(store);
        let d = svc.compute_dashboard(STATION, date()).await;

        assert_eq!(d.availability, 95.8);
        assert_eq!(
            d.index,
            AirQualityIndex {
                value: 121,
                quality: IndexQuality::Ruim,
                color: IndexColor::Orange,
            }
        );

        assert_eq!(d.wind_series[2].direction, "L");
        assert_eq!(d.wind_series[2].velocity, 3.2);
        assert_eq!(d.wind_series[4].velocity, 5.0);
        assert_eq!(d.pollutant_series[2].concentration, 60.0);
        assert_eq!(d.pollutant_series[4].concentration, 130.0);
        assert_eq!(d.wind_series[0].velocity, 0.0);

        // Table order: O3, MP2.5, MP10, NOx, CO, SO2. O3 has a sensor but no readings.
        let params: Vec<_> = d.parameter_statuses.iter().map(|p| p.parameter.as_str()).collect();
        assert_eq!(params, vec!["MP10", "CO"]);
        // The invalidated 500.0 spike is skipped; 130.0 is the latest accepted value.
        assert_eq!(d.parameter_statuses[0].value, 130.0);
        assert_eq!(d.parameter_statuses[0].status, ParameterStatus::Alert);
        assert_eq!(d.parameter_statuses[1].status, ParameterStatus::Alert);
        assert_eq!(d.parameter_statuses[1].unit, "mg/m³");

        assert_eq!(d.hourly_timeline.len(), 24);
        assert!((d.hourly_timeline[7].value - 60.0).abs() < 1e-9);
        assert!((d.hourly_timeline[8].value - 105.0).abs() < 1e-9);
        // Only reading at 09:00 is invalid, so the hour stays empty.
        assert_eq!(d.hourly_timeline[9].value, 0.0);
        assert_eq!(health.store_errors(), 0);
    }

    #[tokio::test]
    async fn invalidated_reading_does_not_drive_parameter_status() {
        let store = seeded();
        store.add_readings(vec![reading(50, 3, 5 * 60, 20.0), reading(51, 3, 6 * 60, 900.0)]);
        store.add_decision(ValidationDecision {
            raw_reading_id: 51,
            is_valid: false,
            justification: "sensor fault".to_string(),
            operator_id: "analyst-2".to_string(),
            created_at: local_midnight() + Duration::hours(7),
        });

        let (svc, _) = services(store);
        let d = svc.compute_dashboard(STATION, date()).await;

        assert_eq!(d.parameter_statuses.len(), 1);
        let mp10 = &d.parameter_statuses[0];
        assert_eq!(mp10.parameter, "MP10");
        assert_eq!(mp10.value, 20.0);
        assert_eq!(mp10.status, ParameterStatus::Normal);
        assert!((d.hourly_timeline[5].value - 20.0).abs() < 1e-9);
        assert_eq!(d.hourly_timeline[6].value, 0.0);
    }

    #[tokio::test]
    async fn only_invalidated_readings_means_no_status() {
        let store = seeded();
        store.add_reading(reading(60, 4, 60, 12.0));
        store.add_decision(ValidationDecision {
            raw_reading_id: 60,
            is_valid: false,
            justification: "maintenance".to_string(),
            operator_id: "analyst-2".to_string(),
            created_at: local_midnight() + Duration::hours(2),
        });

        let (svc, _) = services(store);
        let d = svc.compute_dashboard(STATION, date()).await;
        assert!(d.parameter_statuses.is_empty());
    }

    #[test]
    fn dashboard_serializes_camel_case() {
        let json = serde_json::to_value(Dashboard::empty()).unwrap();
        assert_eq!(json["index"]["quality"], "N/A");
        assert_eq!(json["index"]["color"], "gray");
        assert_eq!(json["windSeries"].as_array().map(Vec::len), Some(8));
        assert_eq!(json["hourlyTimeline"].as_array().map(Vec::len), Some(24));
        assert!(json["parameterStatuses"].as_array().is_some_and(Vec::is_empty));
    }
}
