//! Resident entries and per-model usage patterns

use crate::provider::Provider;
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Weekday labels indexed from Monday
pub const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// One resident artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Validated model identifier
    pub model_id: String,

    /// Provider the artifact came from
    pub provider: Provider,

    /// Size on the cache tier in GB
    pub size_gb: f64,

    /// Last recorded access
    pub last_accessed: DateTime<Utc>,

    /// Number of recorded accesses, at least 1
    pub access_count: u64,

    /// Fetch latency observed when the artifact was placed
    pub load_time_ms: f64,

    /// Absolute artifact path inside the cache-tier root
    pub path: PathBuf,

    /// Free-form annotations
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Historical access times for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePattern {
    pub model_id: String,

    /// Requests per local hour of day
    pub hour_histogram: [u64; 24],

    /// Requests per local weekday, Monday first
    pub day_histogram: [u64; 7],

    pub total_requests: u64,

    /// `total_requests` over the number of weekdays with any activity
    pub avg_daily_requests: f64,

    pub peak_hour: usize,

    pub peak_day: usize,

    /// Provider seen on the latest access
    #[serde(default)]
    pub provider: Option<Provider>,

    /// Latest nonzero load time, kept across eviction
    #[serde(default)]
    pub last_load_time_ms: Option<f64>,
}

impl UsagePattern {
    /// Empty pattern for `model_id`
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            hour_histogram: [0; 24],
            day_histogram: [0; 7],
            total_requests: 0,
            avg_daily_requests: 0.0,
            peak_hour: 0,
            peak_day: 0,
            provider: None,
            last_load_time_ms: None,
        }
    }

    /// Count one request at local time `at`
    pub fn record(&mut self, at: DateTime<Local>) {
        let hour = at.hour() as usize;
        let day = at.weekday().num_days_from_monday() as usize;

        self.hour_histogram[hour] += 1;
        self.day_histogram[day] += 1;
        self.total_requests += 1;
        self.recompute();
    }

    /// Rebuild the derived fields from the histograms
    pub fn recompute(&mut self) {
        self.peak_hour = argmax(&self.hour_histogram);
        self.peak_day = argmax(&self.day_histogram);

        let active_days = self.day_histogram.iter().filter(|&&n| n > 0).count().max(1);
        self.avg_daily_requests = self.total_requests as f64 / active_days as f64;
    }

    /// Histogram totals agree with `total_requests`
    pub fn is_consistent(&self) -> bool {
        self.hour_histogram.iter().sum::<u64>() == self.total_requests
            && self.day_histogram.iter().sum::<u64>() == self.total_requests
    }

    pub fn peak_day_name(&self) -> &'static str {
        DAY_NAMES.get(self.peak_day).copied().unwrap_or("?")
    }
}

/// Index of the largest value; the first one wins ties
fn argmax(counts: &[u64]) -> usize {
    let mut best = 0;
    for (i, &n) in counts.iter().enumerate() {
        if n > counts[best] {
            best = i;
        }
    }
    best
}
