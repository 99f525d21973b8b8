//! Activity charts: run starts over time.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::run::FlowRun;

/// Spans shorter than this are charted hourly
const HOURLY_SPAN_DAYS: i64 = 21;

/// Spans shorter than this are charted daily; anything longer is weekly
const DAILY_SPAN_DAYS: i64 = 500;

/// How far back a daily chart reaches
const DAILY_WINDOW_DAYS: i64 = 100;

/// How far back a weekly chart reaches
const WEEKLY_WINDOW_DAYS: i64 = 500;

/// Width of one histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketWidth {
    /// One bucket per hour
    Hour,

    /// One bucket per calendar day
    Day,

    /// One bucket per ISO week, anchored on Monday
    Week,
}

impl BucketWidth {
    /// Truncate a timestamp to the start of its bucket
    pub fn truncate(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let day = time
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();

        match self {
            BucketWidth::Hour => day + Duration::hours(time.hour() as i64),
            BucketWidth::Day => day,
            BucketWidth::Week => {
                day - Duration::days(time.weekday().num_days_from_monday() as i64)
            }
        }
    }
}

/// Pick a bucket width for the span between the first and last run
pub fn bucket_width_for_span(span: Duration) -> BucketWidth {
    if span < Duration::days(HOURLY_SPAN_DAYS) {
        BucketWidth::Hour
    } else if span < Duration::days(DAILY_SPAN_DAYS) {
        BucketWidth::Day
    } else {
        BucketWidth::Week
    }
}

/// Histogram of run starts plus hour-of-day and day-of-week rollups
#[derive(Debug, Clone, Serialize)]
pub struct ActivityChart {
    /// Width used for the histogram buckets
    pub bucket_width: BucketWidth,

    /// Run counts per bucket start, in chronological order
    pub histogram: Vec<(DateTime<Utc>, u64)>,

    /// Run counts by hour of day, index 0 = midnight UTC
    pub by_hour_of_day: [u64; 24],

    /// Run counts by day of week, index 0 = Monday
    pub by_day_of_week: [u64; 7],
}

impl ActivityChart {
    /// Build the chart for a flow's runs.
    ///
    /// The span between the earliest and latest run picks the bucket width.
    /// Hourly charts reach back to an hour before the first run; daily and
    /// weekly charts are clipped to a trailing window ending at the latest
    /// run, so runs older than the window are not charted. Soft-deleted
    /// runs are skipped.
    pub fn build<'a>(runs: impl IntoIterator<Item = &'a FlowRun>) -> Self {
        let runs: Vec<&FlowRun> = runs.into_iter().filter(|r| !r.is_deleted).collect();

        let (Some(first), Some(last)) = (
            runs.iter().map(|r| r.created_on).min(),
            runs.iter().map(|r| r.created_on).max(),
        ) else {
            return Self {
                bucket_width: BucketWidth::Day,
                histogram: Vec::new(),
                by_hour_of_day: [0; 24],
                by_day_of_week: [0; 7],
            };
        };

        let bucket_width = bucket_width_for_span(last - first);
        let min_date = match bucket_width {
            BucketWidth::Hour => first - Duration::hours(1),
            BucketWidth::Day => last - Duration::days(DAILY_WINDOW_DAYS),
            BucketWidth::Week => last - Duration::days(WEEKLY_WINDOW_DAYS),
        };

        let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
        let mut by_hour_of_day = [0u64; 24];
        let mut by_day_of_week = [0u64; 7];

        for run in runs {
            if run.created_on < min_date {
                continue;
            }

            *buckets.entry(bucket_width.truncate(run.created_on)).or_default() += 1;
            by_hour_of_day[run.created_on.hour() as usize] += 1;
            by_day_of_week[run.created_on.weekday().num_days_from_monday() as usize] += 1;
        }

        Self {
            bucket_width,
            histogram: buckets.into_iter().collect(),
            by_hour_of_day,
            by_day_of_week,
        }
    }
}
