use chrono_tz::Tz;

use crate::error::{AppError, Result};

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Row cap for period-based reconciliation queries.
pub const PERIOD_ROW_LIMIT: usize = 500;

/// Row cap for explicit date-range reconciliation queries.
pub const RANGE_ROW_LIMIT: usize = 2000;

/// Row cap for each sensor fetched by the directional engine (one local day).
pub const DIRECTIONAL_ROW_LIMIT: usize = 5000;

/// Upper bound for PENDING_REVIEW_HOURS (ten years).
pub const MAX_PENDING_REVIEW_HOURS: i64 = 24 * 366 * 10;

/// Display format for reconciled and aggregated rows, in the station timezone.
pub const DISPLAY_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Canonical keys of the wind sensors paired by the directional engine.
pub const WIND_DIRECTION_KEY: &str = "DV";
pub const WIND_SPEED_KEY: &str = "VV";

pub const DEFAULT_DIRECTIONAL_POLLUTANT: &str = "MP10";

/// Compass sectors in emission order, 45 degrees each starting at north.
pub const COMPASS_LABELS: [&str; 8] = ["N", "NE", "L", "SE", "S", "SO", "O", "NO"];

pub const DEFAULT_UNIT: &str = "µg/m³";

/// Canonical parameter → display unit.
pub const PARAMETER_UNITS: &[(&str, &str)] = &[
    ("O3", "µg/m³"),
    ("SO2", "µg/m³"),
    ("HCT", "µg/m³"),
    ("BTEX", "µg/m³"),
    ("MP10", "µg/m³"),
    ("MP2.5", "µg/m³"),
    ("NOx", "ppb"),
    ("CO", "mg/m³"),
];

/// Canonical parameter → (alert, critical). A value at or above a limit
/// enters that band.
pub const PARAMETER_THRESHOLDS: &[(&str, f64, f64)] = &[
    ("O3", 100.0, 200.0),
    ("MP2.5", 50.0, 100.0),
    ("MP10", 100.0, 200.0),
    ("NOx", 150.0, 300.0),
    ("CO", 3.0, 9.0),
    ("SO2", 100.0, 200.0),
];

/// Inclusive upper bounds of the five-band air quality index.
pub mod index_bands {
    pub const BOA_MAX: i32 = 50;
    pub const MODERADA_MAX: i32 = 100;
    pub const RUIM_MAX: i32 = 150;
    pub const MUITO_RUIM_MAX: i32 = 200;
}

/// Inclusive upper bounds of the three-band index levels.
pub mod index_levels {
    pub const GOOD_MAX: i32 = 50;
    pub const MODERATE_MAX: i32 = 100;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    /// Empty process-local store. Smoke-test mode: every station is unknown,
    /// so every endpoint serves its empty default.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub store_backend: StoreBackend,
    pub db_path: String,
    pub api_port: u16,
    /// Zone used for local days, hourly buckets and displayed date-times (STATION_TIMEZONE)
    pub timezone: Tz,
    /// Undecided readings younger than this are reported as pending (PENDING_REVIEW_HOURS).
    /// Unset keeps undecided readings valid.
    pub pending_review_hours: Option<i64>,
    /// Pollutant paired with wind direction for the pollutant rose (DIRECTIONAL_POLLUTANT)
    pub directional_pollutant: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .as_str()
        {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be 'sqlite' or 'memory', got '{other}'"
                )))
            }
        };

        let timezone_name =
            std::env::var("STATION_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string());
        let timezone = timezone_name.parse::<Tz>().map_err(|_| {
            AppError::Config(format!("STATION_TIMEZONE '{timezone_name}' is not a known zone"))
        })?;

        let pending_review_hours = match std::env::var("PENDING_REVIEW_HOURS") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_pending_review_hours(&raw)?),
            _ => None,
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            store_backend,
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "airwatch.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            timezone,
            pending_review_hours,
            directional_pollutant: std::env::var("DIRECTIONAL_POLLUTANT")
                .map(|p| crate::normalizer::normalize_parameter(&p))
                .unwrap_or_else(|_| DEFAULT_DIRECTIONAL_POLLUTANT.to_string()),
        })
    }
}

/// Display unit for a canonical parameter key.
pub fn unit_for(parameter: &str) -> &'static str {
    PARAMETER_UNITS
        .iter()
        .find(|(key, _)| *key == parameter)
        .map(|(_, unit)| *unit)
        .unwrap_or(DEFAULT_UNIT)
}

/// Positive whole hours, at most `MAX_PENDING_REVIEW_HOURS`.
fn parse_pending_review_hours(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|h| (1..=MAX_PENDING_REVIEW_HOURS).contains(h))
        .ok_or_else(|| {
            AppError::Config(format!(
                "PENDING_REVIEW_HOURS must be between 1 and {MAX_PENDING_REVIEW_HOURS}, got '{}'",
                raw.trim()
            ))
        })
}

/// (alert, critical) limits for a canonical parameter key.
pub fn thresholds_for(parameter: &str) -> Option<(f64, f64)> {
    PARAMETER_THRESHOLDS
        .iter()
        .find(|(key, _, _)| *key == parameter)
        .map(|(_, alert, critical)| (*alert, *critical))
}
