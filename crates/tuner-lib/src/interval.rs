//! Per-interval metric snapshots
//!
//! An [`IntervalResults`] fixes its time boundaries at construction and
//! receives its metric map exactly once afterwards. Containers store them
//! keyed by interval end in an [`IntervalMap`].

use crate::error::IntervalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interval results of one container, keyed by interval end time
pub type IntervalMap = BTreeMap<DateTime<Utc>, IntervalResults>;

/// Aggregated values of one metric over one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl AggregationInfo {
    /// Value of a named aggregation function (`min`, `max`, `avg`, `sum`)
    pub fn get(&self, function: &str) -> Option<f64> {
        match function {
            "min" => self.min,
            "max" => self.max,
            "avg" => self.avg,
            "sum" => self.sum,
            _ => None,
        }
    }
}

/// Resolved result of one metric; `metadata` carries label values such as JVM version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResults {
    #[serde(default)]
    pub aggregation_info: AggregationInfo,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl MetricResults {
    pub fn from_aggregation(aggregation_info: AggregationInfo) -> Self {
        Self {
            aggregation_info,
            metadata: BTreeMap::new(),
        }
    }

    /// Observed peak: `max`, falling back to `avg`
    pub fn peak(&self) -> Option<f64> {
        self.aggregation_info.max.or(self.aggregation_info.avg)
    }
}

/// One observed measurement window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalResults {
    interval_start_time: DateTime<Utc>,
    interval_end_time: DateTime<Utc>,
    duration_in_seconds: f64,
    duration_in_minutes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<BTreeMap<String, MetricResults>>,
}

impl IntervalResults {
    /// Fix the window boundaries; fails unless `end > start`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IntervalError> {
        if end <= start {
            return Err(IntervalError::InvalidInterval { start, end });
        }
        let millis = (end - start).num_milliseconds() as f64;
        Ok(Self {
            interval_start_time: start,
            interval_end_time: end,
            duration_in_seconds: millis / 1000.0,
            duration_in_minutes: millis / 60_000.0,
            metrics: None,
        })
    }

    /// Build and attach metrics in one step
    pub fn with_metrics(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        metrics: BTreeMap<String, MetricResults>,
    ) -> Result<Self, IntervalError> {
        let mut interval = Self::new(start, end)?;
        interval.set_metrics(metrics)?;
        Ok(interval)
    }

    /// Attach the metric map; allowed exactly once
    pub fn set_metrics(
        &mut self,
        metrics: BTreeMap<String, MetricResults>,
    ) -> Result<(), IntervalError> {
        if self.metrics.is_some() {
            return Err(IntervalError::MetricsAlreadySet {
                end: self.interval_end_time,
            });
        }
        self.metrics = Some(metrics);
        Ok(())
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.interval_start_time
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.interval_end_time
    }

    pub fn duration_in_seconds(&self) -> f64 {
        self.duration_in_seconds
    }

    pub fn duration_in_minutes(&self) -> f64 {
        self.duration_in_minutes
    }

    pub fn has_metrics(&self) -> bool {
        self.metrics.as_ref().map(|m| !m.is_empty()).unwrap_or(false)
    }

    pub fn metrics(&self) -> Option<&BTreeMap<String, MetricResults>> {
        self.metrics.as_ref()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricResults> {
        self.metrics.as_ref().and_then(|m| m.get(name))
    }
}

/// Largest per-interval peak of `metric` across all intervals
pub fn max_peak(intervals: &IntervalMap, metric: &str) -> Option<f64> {
    intervals
        .values()
        .filter_map(|i| i.metric(metric).and_then(MetricResults::peak))
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// Peak of `metric` in the most recent interval that reports it
pub fn latest_peak(intervals: &IntervalMap, metric: &str) -> Option<f64> {
    intervals
        .values()
        .rev()
        .find_map(|i| i.metric(metric).and_then(MetricResults::peak))
}

/// Metadata value of `metric` in the most recent interval that carries `key`
pub fn latest_metadata<'a>(intervals: &'a IntervalMap, metric: &str, key: &str) -> Option<&'a str> {
    intervals
        .values()
        .rev()
        .find_map(|i| i.metric(metric).and_then(|m| m.metadata.get(key)))
        .map(String::as_str)
}

/// Keep only intervals ending within `window` of the latest interval end
///
/// A window reaching past the earliest representable time keeps everything.
pub fn within_window(intervals: &IntervalMap, window: chrono::Duration) -> IntervalMap {
    let Some(latest) = intervals.keys().next_back().copied() else {
        return IntervalMap::new();
    };
    let Some(cutoff) = latest.checked_sub_signed(window) else {
        return intervals.clone();
    };
    intervals
        .range(cutoff..)
        .filter(|(end, _)| **end > cutoff)
        .map(|(end, interval)| (*end, interval.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn metric(max: Option<f64>, avg: Option<f64>) -> MetricResults {
        MetricResults::from_aggregation(AggregationInfo {
            max,
            avg,
            ..Default::default()
        })
    }

    #[test]
    fn test_duration_derived_from_timestamps() {
        let interval = IntervalResults::new(ts(0), ts(900)).unwrap();
        assert_eq!(interval.duration_in_seconds(), 900.0);
        assert_eq!(interval.duration_in_minutes(), 15.0);

        let odd = IntervalResults::new(ts(0), ts(61)).unwrap();
        assert_eq!(odd.duration_in_minutes(), 61_000.0 / 60_000.0);
    }

    #[test]
    fn test_rejects_non_increasing_window() {
        assert!(matches!(
            IntervalResults::new(ts(10), ts(0)),
            Err(IntervalError::InvalidInterval { .. })
        ));
        assert!(IntervalResults::new(ts(5), ts(5)).is_err());
    }

    #[test]
    fn test_metrics_set_once() {
        let mut interval = IntervalResults::new(ts(0), ts(60)).unwrap();
        assert!(!interval.has_metrics());
        interval.set_metrics(BTreeMap::new()).unwrap();
        let again = interval.set_metrics(BTreeMap::new());
        assert!(matches!(again, Err(IntervalError::MetricsAlreadySet { .. })));
    }

    #[test]
    fn test_peak_falls_back_to_avg() {
        assert_eq!(metric(Some(5.0), Some(3.0)).peak(), Some(5.0));
        assert_eq!(metric(None, Some(3.0)).peak(), Some(3.0));
        assert_eq!(metric(None, None).peak(), None);
    }

    #[test]
    fn test_max_and_latest_peak() {
        let mut intervals = IntervalMap::new();
        for (i, value) in [4.0, 9.0, 2.0].iter().enumerate() {
            let start = ts(i as i64 * 60);
            let end = ts(i as i64 * 60 + 60);
            let mut metrics = BTreeMap::new();
            metrics.insert("threads".to_string(), metric(Some(*value), None));
            intervals.insert(end, IntervalResults::with_metrics(start, end, metrics).unwrap());
        }
        assert_eq!(max_peak(&intervals, "threads"), Some(9.0));
        assert_eq!(latest_peak(&intervals, "threads"), Some(2.0));
        assert_eq!(max_peak(&intervals, "missing"), None);
    }

    #[test]
    fn test_window_filter() {
        let mut intervals = IntervalMap::new();
        for hour in 0..30 {
            let start = ts(hour * 3600);
            let end = ts(hour * 3600 + 3600);
            intervals.insert(end, IntervalResults::new(start, end).unwrap());
        }
        let last_day = within_window(&intervals, Duration::days(1));
        assert_eq!(last_day.len(), 24);
        assert!(within_window(&IntervalMap::new(), Duration::days(1)).is_empty());
    }

    #[test]
    fn test_window_past_min_time_keeps_all() {
        let mut intervals = IntervalMap::new();
        for i in 0..3 {
            let end = ts(i * 900 + 900);
            intervals.insert(end, IntervalResults::new(ts(i * 900), end).unwrap());
        }
        let huge = Duration::try_milliseconds(i64::MAX).unwrap();
        assert_eq!(within_window(&intervals, huge).len(), 3);
    }
}
