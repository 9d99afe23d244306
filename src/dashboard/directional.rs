//! Wind-rose and pollutant-rose statistics.
//!
//! Every wind-direction reading is paired with the wind-speed and pollutant
//! readings closest to it in time, then grouped into eight 45° sectors.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::COMPASS_LABELS;
use crate::types::RawReading;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSample {
    pub direction: &'static str,
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantSample {
    pub direction: &'static str,
    pub concentration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalSeries {
    pub wind: Vec<WindSample>,
    pub pollutant: Vec<PollutantSample>,
}

impl DirectionalSeries {
    /// All eight sectors at zero.
    pub fn zeroed() -> Self {
        compute_roses(&[], &[], &[])
    }
}

/// Sector index for a bearing in degrees: `round(deg / 45) mod 8`, so
/// 22.5° and above rounds into NE. Negative bearings wrap.
pub fn compass_index(degrees: f64) -> usize {
    ((degrees / 45.0).round() as i64).rem_euclid(8) as usize
}

/// Reading in `sorted` (ascending by timestamp) nearest to `at`. Ties go to
/// the earlier reading.
pub fn nearest_in_time(sorted: &[RawReading], at: DateTime<Utc>) -> Option<&RawReading> {
    let idx = sorted.partition_point(|r| r.timestamp < at);
    let before = idx.checked_sub(1).and_then(|i| sorted.get(i));
    let after = sorted.get(idx);
    match (before, after) {
        (Some(b), Some(a)) => {
            if at - b.timestamp <= a.timestamp - at {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn sorted_by_time(readings: &[RawReading]) -> Vec<RawReading> {
    let mut sorted = readings.to_vec();
    sorted.sort_by_key(|r| r.timestamp);
    sorted
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Clone, Copy, Default)]
struct SectorSum {
    sum: f64,
    count: usize,
}

impl SectorSum {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Build both roses. Speed means are rounded to one decimal, pollutant
/// means to an integer; sectors without matches are 0.
pub fn compute_roses(
    directions: &[RawReading],
    speeds: &[RawReading],
    pollutant: &[RawReading],
) -> DirectionalSeries {
    let speeds = sorted_by_time(speeds);
    let pollutant = sorted_by_time(pollutant);

    let mut speed_sums = [SectorSum::default(); 8];
    let mut pollutant_sums = [SectorSum::default(); 8];

    for direction in directions {
        let sector = compass_index(direction.value);
        if let Some(s) = nearest_in_time(&speeds, direction.timestamp) {
            speed_sums[sector].add(s.value);
        }
        if let Some(p) = nearest_in_time(&pollutant, direction.timestamp) {
            pollutant_sums[sector].add(p.value);
        }
    }

    let wind = COMPASS_LABELS
        .into_iter()
        .zip(speed_sums)
        .map(|(label, sum)| WindSample {
            direction: label,
            velocity: sum.mean().map(|m| round_to(m, 1)).unwrap_or(0.0),
        })
        .collect();

    let pollutant = COMPASS_LABELS
        .into_iter()
        .zip(pollutant_sums)
        .map(|(label, sum)| PollutantSample {
            direction: label,
            concentration: sum.mean().map(f64::round).unwrap_or(0.0),
        })
        .collect();

    DirectionalSeries { wind, pollutant }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
    }

    fn at(minutes: i64, value: f64) -> RawReading {
        RawReading {
            id: minutes,
            sensor_id: 1,
            station_id: 1,
            parameter: "X".to_string(),
            value,
            timestamp: t0() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn compass_sectors() {
        assert_eq!(compass_index(0.0), 0);
        assert_eq!(compass_index(22.4), 0);
        assert_eq!(compass_index(22.5), 1);
        assert_eq!(compass_index(90.0), 2);
        assert_eq!(compass_index(200.0), 4);
        assert_eq!(compass_index(337.4), 7);
        assert_eq!(compass_index(337.5), 0);
        assert_eq!(compass_index(360.0), 0);
        assert_eq!(compass_index(-45.0), 7);
    }

    #[test]
    fn nearest_prefers_closest_then_earlier() {
        let series = vec![at(0, 1.0), at(10, 2.0), at(20, 3.0)];
        let probe = |m: i64| nearest_in_time(&series, t0() + Duration::minutes(m)).map(|r| r.value);
        assert_eq!(probe(-30), Some(1.0));
        assert_eq!(probe(4), Some(1.0));
        assert_eq!(probe(5), Some(1.0));
        assert_eq!(probe(6), Some(2.0));
        assert_eq!(probe(10), Some(2.0));
        assert_eq!(probe(99), Some(3.0));
        assert_eq!(nearest_in_time(&[], t0()), None);
    }

    #[test]
    fn always_eight_sectors_even_without_data() {
        let roses = DirectionalSeries::zeroed();
        assert_eq!(roses.wind.len(), 8);
        assert_eq!(roses.pollutant.len(), 8);
        assert!(roses.wind.iter().all(|w| w.velocity == 0.0));
        assert!(roses.pollutant.iter().all(|p| p.concentration == 0.0));
        let labels: Vec<_> = roses.wind.iter().map(|w| w.direction).collect();
        assert_eq!(labels, COMPASS_LABELS.to_vec());
    }

    #[test]
    fn pairs_and_averages_per_sector() {
        let directions = vec![at(0, 10.0), at(10, 350.0), at(20, 95.0), at(30, 181.0)];
        // Unsorted on purpose.
        let speeds = vec![at(29, 4.0), at(1, 2.0), at(9, 3.05), at(21, 1.5)];
        let pollutant = vec![at(2, 40.0), at(12, 45.0), at(18, 70.4), at(40, 12.0)];

        let roses = compute_roses(&directions, &speeds, &pollutant);

        // N collects the readings at 0 and 10 minutes.
        assert_eq!(roses.wind[0].velocity, 2.5);
        assert_eq!(roses.pollutant[0].concentration, 43.0);
        // L (east) from the 95° reading.
        assert_eq!(roses.wind[2].velocity, 1.5);
        assert_eq!(roses.pollutant[2].concentration, 70.0);
        // S from the 181° reading.
        assert_eq!(roses.wind[4].velocity, 4.0);
        assert_eq!(roses.pollutant[4].concentration, 12.0);
        assert_eq!(roses.wind[1].velocity, 0.0);
        assert_eq!(roses.pollutant[7].concentration, 0.0);
    }

    #[test]
    fn missing_speed_sensor_only_zeroes_wind() {
        let directions = vec![at(0, 45.0)];
        let pollutant = vec![at(0, 33.0)];
        let roses = compute_roses(&directions, &[], &pollutant);
        assert!(roses.wind.iter().all(|w| w.velocity == 0.0));
        assert_eq!(roses.pollutant[1].concentration, 33.0);
    }
}
