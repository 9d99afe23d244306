use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::consistency::{aggregate, ConsistencyService};
use crate::dashboard::classifier::{
    classify_index, classify_index_level, classify_parameter, IndexColor, IndexLevel,
    IndexQuality, ParameterStatus,
};
use crate::dashboard::{Dashboard, DashboardService};
use crate::error::AppError;
use crate::normalizer::normalize_parameter;
use crate::types::{AggregatedRow, Granularity, Period, ReadingWindow, TimeRange};

#[derive(Clone)]
pub struct ApiState {
    pub consistency: Arc<ConsistencyService>,
    pub dashboard: Arc<DashboardService>,
    pub health: Arc<HealthState>,
    pub reconcile_latency: Arc<LatencyStats>,
    pub dashboard_latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stations/:name/readings", get(get_station_readings))
        .route("/stations/:name/dashboard", get(get_station_dashboard))
        .route("/classify/index/:value", get(get_classify_index))
        .route("/classify/parameter/:parameter/:value", get(get_classify_parameter))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub parameter: String,
    pub period: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub date: Option<NaiveDate>,
}

impl ReadingsQuery {
    /// Explicit `start`/`end` wins over `period`; neither means the last 24h.
    fn window(&self) -> Result<ReadingWindow, AppError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                if end <= start {
                    return Err(AppError::Validation(format!(
                        "end ({end}) must be after start ({start})"
                    )));
                }
                Ok(ReadingWindow::Range(TimeRange::new(start, end)))
            }
            (Some(_), None) | (None, Some(_)) => Err(AppError::Validation(
                "start and end must be given together".to_string(),
            )),
            (None, None) => {
                let period = match self.period.as_deref() {
                    Some(p) => p.parse::<Period>().map_err(AppError::Validation)?,
                    None => Period::Last24h,
                };
                Ok(ReadingWindow::Period(period))
            }
        }
    }

    fn granularity(&self) -> Result<Granularity, AppError> {
        match self.granularity.as_deref() {
            Some(g) => g.parse().map_err(AppError::Validation),
            None => Ok(Granularity::OneMinute),
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_errors: u64,
    pub last_store_error_at_ns: u64,
    pub requests_served: u64,
}

#[derive(Serialize)]
pub struct IndexClassificationResponse {
    pub value: i32,
    pub quality: IndexQuality,
    pub color: IndexColor,
    pub level: IndexLevel,
}

#[derive(Serialize)]
pub struct ParameterClassificationResponse {
    pub parameter: String,
    pub value: f64,
    pub status: ParameterStatus,
}

#[derive(Serialize)]
pub struct LatencySummary {
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
    pub samples: u64,
}

impl From<&LatencyStats> for LatencySummary {
    fn from(stats: &LatencyStats) -> Self {
        let (p50_us, p95_us, p99_us) = stats.percentiles();
        Self {
            p50_us,
            p95_us,
            p99_us,
            samples: stats.len(),
        }
    }
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub reconcile: LatencySummary,
    pub dashboard: LatencySummary,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let health = &state.health;
    Json(HealthResponse {
        status: if health.is_degraded() { "degraded" } else { "ok" },
        store_errors: health.store_errors(),
        last_store_error_at_ns: health.last_store_error_at_ns(),
        requests_served: health.requests_served(),
    })
}

async fn get_station_readings(
    State(state): State<ApiState>,
    Path(station): Path<String>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<AggregatedRow>>, AppError> {
    let window = params.window()?;
    let granularity = params.granularity()?;

    let started = Instant::now();
    let rows = state
        .consistency
        .reconcile(&station, &params.parameter, window)
        .await;
    let rows = aggregate(rows, granularity);
    state.reconcile_latency.record(started.elapsed());
    state.health.inc_requests_served();

    debug!(
        station = %station,
        parameter = %params.parameter,
        ?window,
        ?granularity,
        rows = rows.len(),
        "Readings served"
    );
    Ok(Json(rows))
}

async fn get_station_dashboard(
    State(state): State<ApiState>,
    Path(station): Path<String>,
    Query(params): Query<DashboardQuery>,
) -> Json<Dashboard> {
    let date = params.date.unwrap_or_else(|| state.dashboard.today());

    let started = Instant::now();
    let dashboard = state.dashboard.compute_dashboard(&station, date).await;
    state.dashboard_latency.record(started.elapsed());
    state.health.inc_requests_served();

    Json(dashboard)
}

async fn get_classify_index(Path(value): Path<i32>) -> Json<IndexClassificationResponse> {
    let band = classify_index(value);
    Json(IndexClassificationResponse {
        value,
        quality: band.quality,
        color: band.color,
        level: classify_index_level(value),
    })
}

async fn get_classify_parameter(
    Path((parameter, value)): Path<(String, f64)>,
) -> Json<ParameterClassificationResponse> {
    Json(ParameterClassificationResponse {
        parameter: normalize_parameter(&parameter),
        value,
        status: classify_parameter(&parameter, value),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        reconcile: LatencySummary::from(state.reconcile_latency.as_ref()),
        dashboard: LatencySummary::from(state.dashboard_latency.as_ref()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn query() -> ReadingsQuery {
        ReadingsQuery {
            parameter: "MP10".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn window_defaults_to_last_24h() {
        assert_eq!(query().window().unwrap(), ReadingWindow::Period(Period::Last24h));
        assert_eq!(query().granularity().unwrap(), Granularity::OneMinute);
    }

    #[test]
    fn window_parses_period_and_granularity() {
        let q = ReadingsQuery {
            period: Some("Last 7d".to_string()),
            granularity: Some("15min".to_string()),
            ..query()
        };
        assert_eq!(q.window().unwrap(), ReadingWindow::Period(Period::Last7d));
        assert_eq!(q.granularity().unwrap(), Granularity::FifteenMinutes);
    }

    #[test]
    fn explicit_range_overrides_period() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 11, 3, 0, 0).unwrap();
        let q = ReadingsQuery {
            period: Some("Last 90d".to_string()),
            start: Some(start),
            end: Some(end),
            ..query()
        };
        assert_eq!(q.window().unwrap(), ReadingWindow::Range(TimeRange::new(start, end)));
    }

    #[test]
    fn malformed_windows_are_rejected() {
        let t = Utc.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap();
        let inverted = ReadingsQuery {
            start: Some(t),
            end: Some(t),
            ..query()
        };
        assert!(matches!(inverted.window(), Err(AppError::Validation(_))));

        let half_open = ReadingsQuery {
            start: Some(t),
            ..query()
        };
        assert!(matches!(half_open.window(), Err(AppError::Validation(_))));

        let bad_period = ReadingsQuery {
            period: Some("Last 2y".to_string()),
            ..query()
        };
        assert!(matches!(bad_period.window(), Err(AppError::Validation(_))));

        let bad_granularity = ReadingsQuery {
            granularity: Some("5min".to_string()),
            ..query()
        };
        assert!(matches!(bad_granularity.granularity(), Err(AppError::Validation(_))));
    }

    #[test]
    fn latency_summary_reports_samples() {
        let stats = LatencyStats::new();
        stats.record_us(120);
        stats.record_us(480);
        let summary = LatencySummary::from(&stats);
        assert_eq!(summary.samples, 2);
        assert!(summary.p50_us.is_some());
    }
}
