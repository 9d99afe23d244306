use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::warn;

use crate::config::DISPLAY_DATETIME_FORMAT;
use crate::types::{AggregatedRow, ClassifiedRow, Granularity, ReadingStatus};

/// Mean of the non-invalid rows that fell into one time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketMean {
    pub date: NaiveDate,
    /// floor(minutes since local midnight / interval)
    pub index: u32,
    pub start: NaiveDateTime,
    pub mean: f64,
    pub pending: bool,
    pub unit: String,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: usize,
    pending: bool,
    unit: String,
}

/// Group rows into `interval_minutes` buckets keyed by (local date, bucket
/// index) and average each bucket, ascending by key.
///
/// Invalid rows never contribute; a bucket left with nothing to average is
/// dropped. Rows whose date-time or value cannot be parsed are skipped.
pub fn bucket_means(rows: &[ClassifiedRow], interval_minutes: u32) -> Vec<BucketMean> {
    let mut buckets: BTreeMap<(NaiveDate, u32), Accumulator> = BTreeMap::new();

    for row in rows {
        let Ok(at) = NaiveDateTime::parse_from_str(&row.date_time, DISPLAY_DATETIME_FORMAT) else {
            warn!(date_time = %row.date_time, "Skipping row with unparseable date-time");
            continue;
        };
        let minutes = at.hour() * 60 + at.minute();
        let key = (at.date(), minutes / interval_minutes);

        let acc = buckets.entry(key).or_insert_with(|| Accumulator {
            unit: row.unit.clone(),
            ..Default::default()
        });
        match row.status {
            ReadingStatus::Invalid => continue,
            ReadingStatus::Pending => acc.pending = true,
            ReadingStatus::Valid => {}
        }
        match row.raw_value.parse::<f64>() {
            Ok(value) => {
                acc.sum += value;
                acc.count += 1;
            }
            Err(_) => warn!(raw_value = %row.raw_value, "Skipping row with non-numeric value"),
        }
    }

    buckets
        .into_iter()
        .filter(|(_, acc)| acc.count > 0)
        .map(|((date, index), acc)| BucketMean {
            date,
            index,
            start: date.and_time(NaiveTime::MIN)
                + Duration::minutes(i64::from(index * interval_minutes)),
            mean: acc.sum / acc.count as f64,
            pending: acc.pending,
            unit: acc.unit,
        })
        .collect()
}

/// Collapse finest-granularity rows into `granularity` buckets.
///
/// `1min` returns the input untouched. Otherwise each surviving bucket
/// becomes one row dated at the bucket start, carrying the one-decimal mean
/// as both raw and final value, `pending` if any input row was pending and
/// `valid` otherwise. Ids are reassigned `1..=N`.
pub fn aggregate(rows: Vec<ClassifiedRow>, granularity: Granularity) -> Vec<AggregatedRow> {
    let Some(interval) = granularity.interval_minutes() else {
        return rows;
    };

    bucket_means(&rows, interval)
        .into_iter()
        .enumerate()
        .map(|(i, bucket)| {
            let value = format!("{:.1}", bucket.mean);
            AggregatedRow {
                sequence_id: i + 1,
                date_time: bucket.start.format(DISPLAY_DATETIME_FORMAT).to_string(),
                raw_value: value.clone(),
                final_value: value,
                unit: bucket.unit,
                status: if bucket.pending {
                    ReadingStatus::Pending
                } else {
                    ReadingStatus::Valid
                },
                justification: String::new(),
                operator: String::new(),
                raw_data_id: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: usize, date_time: &str, value: f64, status: ReadingStatus) -> ClassifiedRow {
        let raw = format!("{value:.1}");
        ClassifiedRow {
            sequence_id: id,
            date_time: date_time.to_string(),
            raw_value: raw.clone(),
            final_value: if status == ReadingStatus::Invalid { "-".to_string() } else { raw },
            unit: "µg/m³".to_string(),
            status,
            justification: String::new(),
            operator: String::new(),
            raw_data_id: Some(id as i64),
        }
    }

    #[test]
    fn invalid_rows_are_excluded_from_the_mean() {
        let rows = vec![
            row(1, "10/03/2025 08:00:00", 10.0, ReadingStatus::Valid),
            row(2, "10/03/2025 08:20:00", 20.0, ReadingStatus::Valid),
            row(3, "10/03/2025 08:40:00", 30.0, ReadingStatus::Invalid),
        ];
        let out = aggregate(rows, Granularity::OneHour);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw_value, "15.0");
        assert_eq!(out[0].final_value, "15.0");
        assert_eq!(out[0].status, ReadingStatus::Valid);
        assert_eq!(out[0].date_time, "10/03/2025 08:00:00");
        assert_eq!(out[0].raw_data_id, None);
    }

    #[test]
    fn all_invalid_bucket_is_dropped() {
        let rows = vec![
            row(1, "10/03/2025 08:05:00", 10.0, ReadingStatus::Invalid),
            row(2, "10/03/2025 08:10:00", 20.0, ReadingStatus::Invalid),
            row(3, "10/03/2025 08:20:00", 30.0, ReadingStatus::Valid),
        ];
        let out = aggregate(rows, Granularity::FifteenMinutes);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sequence_id, 1);
        assert_eq!(out[0].date_time, "10/03/2025 08:15:00");
        assert_eq!(out[0].raw_value, "30.0");
    }

    #[test]
    fn pending_propagates_to_bucket() {
        let rows = vec![
            row(1, "10/03/2025 08:00:00", 10.0, ReadingStatus::Valid),
            row(2, "10/03/2025 08:01:00", 11.0, ReadingStatus::Pending),
            row(3, "10/03/2025 09:00:00", 12.0, ReadingStatus::Valid),
            row(4, "10/03/2025 09:01:00", 13.0, ReadingStatus::Invalid),
        ];
        let out = aggregate(rows, Granularity::OneHour);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].status, ReadingStatus::Pending);
        assert_eq!(out[0].raw_value, "10.5");
        assert_eq!(out[1].status, ReadingStatus::Valid);
        assert_eq!(out[1].raw_value, "12.0");
    }

    #[test]
    fn one_minute_is_pass_through() {
        let rows = vec![
            row(1, "10/03/2025 08:00:00", 10.0, ReadingStatus::Valid),
            row(2, "10/03/2025 08:01:00", 30.0, ReadingStatus::Invalid),
        ];
        assert_eq!(aggregate(rows.clone(), Granularity::OneMinute), rows);
    }

    #[test]
    fn buckets_are_ordered_by_date_then_index() {
        let rows = vec![
            row(1, "11/03/2025 00:10:00", 4.0, ReadingStatus::Valid),
            row(2, "10/03/2025 23:50:00", 3.0, ReadingStatus::Valid),
            row(3, "10/03/2025 01:00:00", 2.0, ReadingStatus::Valid),
            row(4, "09/03/2025 12:00:00", 1.0, ReadingStatus::Valid),
        ];
        let out = aggregate(rows, Granularity::OneDay);
        let dates: Vec<_> = out.iter().map(|r| r.date_time.as_str()).collect();
        assert_eq!(
            dates,
            vec!["09/03/2025 00:00:00", "10/03/2025 00:00:00", "11/03/2025 00:00:00"]
        );
        assert_eq!(out[1].raw_value, "2.5");
        assert_eq!(out.iter().map(|r| r.sequence_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let rows = vec![
            row(1, "not a date", 99.0, ReadingStatus::Valid),
            row(2, "10/03/2025 08:00:00", 10.0, ReadingStatus::Valid),
        ];
        let out = aggregate(rows, Granularity::OneHour);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw_value, "10.0");
    }

    #[test]
    fn bucket_means_expose_index() {
        let rows = vec![
            row(1, "10/03/2025 13:44:00", 7.0, ReadingStatus::Valid),
            row(2, "10/03/2025 13:46:00", 9.0, ReadingStatus::Valid),
        ];
        let means = bucket_means(&rows, 15);
        assert_eq!(means.len(), 2);
        assert_eq!(means[0].index, 54);
        assert_eq!(means[1].index, 55);
        assert!((means[1].mean - 9.0).abs() < 1e-9);
    }
}
