use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use flow_config::MeterConfig;
use parking_lot::Mutex;

/// One bucket of the meter's rolling ring. `total` is the sum of all amounts
/// recorded while `bucket_start` was the newest bucket.
#[derive(Debug, Clone)]
pub struct WorkUnitBucket {
    pub bucket_start: Instant,
    pub total: f64,
    pub by_type: HashMap<String, f64>,
}

/// A threshold crossing raised on its rising edge. Re-arms once utilization
/// falls back below `percentage - hysteresis_pp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvent {
    pub percentage: u8,
    pub current: f64,
    pub max: f64,
}

struct MeterState {
    buckets: VecDeque<WorkUnitBucket>,
    bucket_duration: Duration,
    num_buckets: usize,
    max_work_units: f64,
    thresholds: Vec<u8>,
    hysteresis_pp: f64,
    /// Parallel to `thresholds`: whether each threshold may fire again.
    armed: Vec<bool>,
}

impl MeterState {
    fn maintain(&mut self, now: Instant) {
        if self.buckets.is_empty() {
            self.buckets.push_back(WorkUnitBucket {
                bucket_start: now,
                total: 0.0,
                by_type: HashMap::new(),
            });
            return;
        }

        let mut rotations = 0usize;
        loop {
            let back_start = self.buckets.back().expect("just checked non-empty").bucket_start;
            if now.saturating_duration_since(back_start) < self.bucket_duration {
                break;
            }
            rotations += 1;
            if rotations > self.num_buckets {
                // Every existing bucket has aged out; start fresh rather
                // than spin one rotation per idle bucket period.
                self.buckets.clear();
                self.buckets.push_back(WorkUnitBucket {
                    bucket_start: now,
                    total: 0.0,
                    by_type: HashMap::new(),
                });
                return;
            }
            self.buckets.push_back(WorkUnitBucket {
                bucket_start: back_start + self.bucket_duration,
                total: 0.0,
                by_type: HashMap::new(),
            });
            if self.buckets.len() > self.num_buckets {
                self.buckets.pop_front();
            }
        }
    }

    fn current(&self) -> f64 {
        self.buckets.iter().map(|b| b.total).sum()
    }

    fn check_thresholds(&mut self) -> Vec<ThresholdEvent> {
        let current = self.current();
        let max = self.max_work_units;
        let mut fired = Vec::new();
        if max <= 0.0 {
            return fired;
        }
        let utilization_pct = (current / max) * 100.0;
        for i in 0..self.thresholds.len() {
            let t = self.thresholds[i];
            let t_f = t as f64;
            if utilization_pct >= t_f {
                if self.armed[i] {
                    self.armed[i] = false;
                    fired.push(ThresholdEvent {
                        percentage: t,
                        current,
                        max,
                    });
                }
            } else if utilization_pct < t_f - self.hysteresis_pp {
                self.armed[i] = true;
            }
        }
        fired
    }
}

/// Rolling per-minute work-unit budget. `Record` and `CanConsume` are
/// separate operations; callers that need atomic admission use
/// [`WorkUnitMeter::check_and_record`], which performs both under one lock.
pub struct WorkUnitMeter {
    state: Mutex<MeterState>,
}

impl WorkUnitMeter {
    pub fn new(config: &MeterConfig, max_work_units: f64) -> Self {
        let num_buckets = config.buckets.max(1);
        let bucket_duration = config.window.as_duration() / num_buckets as u32;
        let mut thresholds = config.thresholds.clone();
        thresholds.sort_unstable();
        let armed = vec![true; thresholds.len()];
        Self {
            state: Mutex::new(MeterState {
                buckets: VecDeque::new(),
                bucket_duration,
                num_buckets,
                max_work_units,
                thresholds,
                hysteresis_pp: config.threshold_hysteresis_pp,
                armed,
            }),
        }
    }

    pub fn set_max_work_units(&self, max: f64) {
        self.state.lock().max_work_units = max;
    }

    pub fn max_work_units(&self) -> f64 {
        self.state.lock().max_work_units
    }

    pub fn current_work_units(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.maintain(now);
        state.current()
    }

    /// Record `amount` work units without checking the budget. Returns any
    /// threshold events whose rising edge this record crossed.
    pub fn record(&self, now: Instant, amount: f64, kind: Option<&str>) -> Vec<ThresholdEvent> {
        let mut state = self.state.lock();
        state.maintain(now);
        {
            let bucket = state.buckets.back_mut().expect("maintain ensures a bucket");
            bucket.total += amount;
            if let Some(k) = kind {
                *bucket.by_type.entry(k.to_string()).or_insert(0.0) += amount;
            }
        }
        state.check_thresholds()
    }

    /// `current + amount <= max`.
    pub fn can_consume(&self, now: Instant, amount: f64) -> bool {
        let mut state = self.state.lock();
        state.maintain(now);
        state.current() + amount <= state.max_work_units
    }

    /// Atomic check-and-record: returns `Some(events)` if admitted, `None`
    /// if the budget would be exceeded (nothing is recorded in that case).
    pub fn check_and_record(
        &self,
        now: Instant,
        amount: f64,
        kind: Option<&str>,
    ) -> Option<Vec<ThresholdEvent>> {
        let mut state = self.state.lock();
        state.maintain(now);
        if state.current() + amount > state.max_work_units {
            return None;
        }
        {
            let bucket = state.buckets.back_mut().expect("maintain ensures a bucket");
            bucket.total += amount;
            if let Some(k) = kind {
                *bucket.by_type.entry(k.to_string()).or_insert(0.0) += amount;
            }
        }
        Some(state.check_thresholds())
    }

    /// Monotone non-increasing function of utilization `u = current / max`.
    pub fn throttle_factor(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.maintain(now);
        let max = state.max_work_units;
        if max <= 0.0 {
            return 0.0;
        }
        let u = state.current() / max;
        if u < 0.5 {
            1.0
        } else if u < 0.8 {
            1.0 - (u - 0.5) / 0.3 * 0.5
        } else if u < 1.0 {
            0.5 - (u - 0.8) / 0.2 * 0.4
        } else {
            0.0
        }
    }
}
