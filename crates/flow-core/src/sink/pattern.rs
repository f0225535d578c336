use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::WindowEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Burst,
    Periodic,
    Anomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetection {
    pub kind: PatternKind,
    pub description: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

const BURST_K_SIGMA: f64 = 2.0;
const BURST_MIN_COUNT: usize = 5;
const PERIODIC_MIN_CONFIDENCE: f64 = 0.2;
const SUB_WINDOW_COUNT: usize = 10;

pub(crate) fn detect(entries: &[WindowEntry], kind: PatternKind, now: DateTime<Utc>) -> Vec<PatternDetection> {
    match kind {
        PatternKind::Burst => detect_burst(entries, now),
        PatternKind::Periodic => detect_periodic(entries, now),
        PatternKind::Anomaly => detect_anomaly(entries, now),
    }
}

/// Buckets entries into `SUB_WINDOW_COUNT` equal spans across the window's
/// observed timespan and returns per-bucket counts, oldest bucket first.
fn bucket_counts(entries: &[WindowEntry]) -> Vec<f64> {
    if entries.is_empty() {
        return Vec::new();
    }
    let oldest = entries.iter().map(|e| e.collected_at).min().unwrap();
    let newest = entries.iter().map(|e| e.collected_at).max().unwrap();
    let span_ms = (newest - oldest).num_milliseconds().max(1) as f64;
    let bucket_ms = span_ms / SUB_WINDOW_COUNT as f64;

    let mut counts = vec![0.0; SUB_WINDOW_COUNT];
    for entry in entries {
        let offset_ms = (entry.collected_at - oldest).num_milliseconds() as f64;
        let idx = ((offset_ms / bucket_ms) as usize).min(SUB_WINDOW_COUNT - 1);
        counts[idx] += 1.0;
    }
    counts
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn detect_burst(entries: &[WindowEntry], now: DateTime<Utc>) -> Vec<PatternDetection> {
    let counts = bucket_counts(entries);
    if counts.len() < 2 {
        return Vec::new();
    }
    let (baseline, latest) = counts.split_at(counts.len() - 1);
    let latest = latest[0];
    let baseline_mean = mean(baseline);
    let baseline_std = stddev(baseline, baseline_mean);

    let is_burst =
        latest as usize >= BURST_MIN_COUNT && latest > baseline_mean + BURST_K_SIGMA * baseline_std;
    if !is_burst {
        return Vec::new();
    }

    let z = if baseline_std > 0.0 {
        (latest - baseline_mean) / baseline_std
    } else {
        BURST_K_SIGMA
    };
    let confidence = (z / (z + BURST_K_SIGMA)).clamp(0.0, 1.0);

    vec![PatternDetection {
        kind: PatternKind::Burst,
        description: format!(
            "rate {latest:.1} exceeds baseline {baseline_mean:.1} by {z:.1} sigma"
        ),
        confidence,
        detected_at: now,
    }]
}

/// Autocorrelation of the bucketed count series up to `len/2` lags; reports
/// the dominant peak if it exceeds [`PERIODIC_MIN_CONFIDENCE`].
fn detect_periodic(entries: &[WindowEntry], now: DateTime<Utc>) -> Vec<PatternDetection> {
    let counts = bucket_counts(entries);
    if counts.len() < 4 {
        return Vec::new();
    }
    let n = counts.len();
    let mean_value = mean(&counts);
    let variance: f64 = counts.iter().map(|v| (v - mean_value).powi(2)).sum();
    if variance <= 0.0 {
        return Vec::new();
    }

    let max_lag = n / 2;
    let mut best_lag = 0;
    let mut best_acf = 0.0;
    for lag in 1..=max_lag {
        let mut cov = 0.0;
        for i in 0..(n - lag) {
            cov += (counts[i] - mean_value) * (counts[i + lag] - mean_value);
        }
        let acf = cov / variance;
        if acf > best_acf {
            best_acf = acf;
            best_lag = lag;
        }
    }

    if best_acf <= PERIODIC_MIN_CONFIDENCE {
        return Vec::new();
    }

    vec![PatternDetection {
        kind: PatternKind::Periodic,
        description: format!("dominant period ~{best_lag} sub-windows (acf={best_acf:.2})"),
        confidence: best_acf.clamp(0.0, 1.0),
        detected_at: now,
    }]
}

fn detect_anomaly(entries: &[WindowEntry], now: DateTime<Utc>) -> Vec<PatternDetection> {
    let mut values: Vec<f64> = entries.iter().filter_map(|e| e.entity.as_f64()).collect();
    if values.len() < 5 {
        return Vec::new();
    }
    let latest = *values.last().unwrap();

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let p99_idx = ((sorted.len() as f64 - 1.0) * 0.99).round() as usize;
    let p99 = sorted[p99_idx];

    values.pop();
    if values.is_empty() || latest <= p99 {
        return Vec::new();
    }

    let spread = (p99 - mean(&values)).abs().max(1e-9);
    let confidence = ((latest - p99) / spread).clamp(0.0, 1.0);

    vec![PatternDetection {
        kind: PatternKind::Anomaly,
        description: format!("value {latest:.3} exceeds rolling p99 {p99:.3}"),
        confidence,
        detected_at: now,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalValue;
    use chrono::Duration as ChronoDuration;

    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn entry_at(t: DateTime<Utc>, v: f64) -> WindowEntry {
        WindowEntry {
            key: None,
            entity: SignalValue::Number(v),
            fingerprint: 0,
            collected_at: t,
            processed: false,
        }
    }

    #[test]
    fn no_patterns_on_small_window() {
        let entries = vec![entry_at(base_time(), 1.0)];
        assert!(detect(&entries, PatternKind::Burst, base_time()).is_empty());
        assert!(detect(&entries, PatternKind::Periodic, base_time()).is_empty());
        assert!(detect(&entries, PatternKind::Anomaly, base_time()).is_empty());
    }

    #[test]
    fn burst_detected_on_spike() {
        let mut entries = Vec::new();
        let start = base_time();
        for i in 0..9 {
            entries.push(entry_at(start + ChronoDuration::seconds(i * 10), 0.0));
        }
        // Dense spike in the final sub-window.
        for i in 0..20 {
            entries.push(entry_at(start + ChronoDuration::seconds(90 + i), 0.0));
        }
        let result = detect(&entries, PatternKind::Burst, base_time());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, PatternKind::Burst);
    }

    #[test]
    fn anomaly_detected_on_outlier() {
        let start = base_time();
        let mut entries: Vec<_> = (0..20)
            .map(|i| entry_at(start + ChronoDuration::seconds(i), 1.0))
            .collect();
        entries.push(entry_at(start + ChronoDuration::seconds(25), 500.0));
        let result = detect(&entries, PatternKind::Anomaly, base_time());
        assert_eq!(result.len(), 1);
    }
}
