use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::signal::{fingerprint_of, SignalValue, WindowEntry, WindowStats};

/// A named sliding window: bounded by item count and by age, evicted
/// age-first then LRU by `collected_at`.
pub(crate) struct Window {
    entries: VecDeque<WindowEntry>,
    max_items: usize,
    max_age: chrono::Duration,
}

impl Window {
    pub(crate) fn new(max_items: usize, max_age: chrono::Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_items: max_items.max(1),
            max_age,
        }
    }

    pub(crate) fn push(&mut self, now: DateTime<Utc>, key: Option<String>, entity: SignalValue) {
        let fingerprint = fingerprint_of(&entity);
        self.entries.push_back(WindowEntry {
            key,
            entity,
            fingerprint,
            collected_at: now,
            processed: false,
        });
        self.evict(now);
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.entries.front() {
            if now - front.collected_at > self.max_age {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        while self.entries.len() > self.max_items {
            self.entries.pop_front();
        }
    }

    /// Ordered by `collected_at` ascending (insertion order, since pushes
    /// are monotonic in wall-clock time under a single clock source).
    pub(crate) fn query(&self) -> Vec<WindowEntry> {
        self.entries.iter().cloned().collect()
    }

    pub(crate) fn stats(&self) -> WindowStats {
        let oldest = self.entries.front().map(|e| e.collected_at);
        let newest = self.entries.back().map(|e| e.collected_at);
        let timespan_ms = match (oldest, newest) {
            (Some(o), Some(n)) => (n - o).num_milliseconds(),
            _ => 0,
        };
        WindowStats {
            count: self.entries.len(),
            oldest,
            newest,
            timespan_ms,
        }
    }

    pub(crate) fn unprocessed(&self) -> Vec<WindowEntry> {
        self.entries.iter().filter(|e| !e.processed).cloned().collect()
    }

    pub(crate) fn mark_processed(&mut self, fingerprints: &[u64]) {
        for entry in self.entries.iter_mut() {
            if fingerprints.contains(&entry.fingerprint) {
                entry.processed = true;
            }
        }
    }

    /// Uniform sample without replacement; deterministic when `seed` is
    /// given, otherwise drawn from the process RNG.
    pub(crate) fn sample(&self, n: usize, seed: Option<u64>) -> Vec<WindowEntry> {
        let mut items: Vec<&WindowEntry> = self.entries.iter().collect();
        match seed {
            Some(s) => {
                let mut rng = rand::rngs::StdRng::seed_from_u64(s);
                items.shuffle(&mut rng);
            }
            None => {
                let mut rng = rand::thread_rng();
                items.shuffle(&mut rng);
            }
        }
        items.into_iter().take(n).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn evicts_by_age_first() {
        let mut w = Window::new(10, ChronoDuration::seconds(5));
        w.push(now(), None, SignalValue::from("a"));
        w.push(now() + ChronoDuration::seconds(10), None, SignalValue::from("b"));
        assert_eq!(w.len(), 1);
        assert_eq!(w.query()[0].entity, SignalValue::from("b"));
    }

    #[test]
    fn evicts_by_capacity_after_age() {
        let mut w = Window::new(2, ChronoDuration::minutes(10));
        w.push(now(), None, SignalValue::from("a"));
        w.push(now(), None, SignalValue::from("b"));
        w.push(now(), None, SignalValue::from("c"));
        assert_eq!(w.len(), 2);
        let values: Vec<_> = w.query().into_iter().map(|e| e.entity).collect();
        assert_eq!(values, vec![SignalValue::from("b"), SignalValue::from("c")]);
    }

    #[test]
    fn stats_reflect_span() {
        let mut w = Window::new(10, ChronoDuration::minutes(10));
        w.push(now(), None, SignalValue::from("a"));
        w.push(now() + ChronoDuration::seconds(5), None, SignalValue::from("b"));
        let stats = w.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.timespan_ms, 5000);
    }

    #[test]
    fn unprocessed_and_mark_processed() {
        let mut w = Window::new(10, ChronoDuration::minutes(10));
        w.push(now(), None, SignalValue::from("a"));
        let fp = w.query()[0].fingerprint;
        assert_eq!(w.unprocessed().len(), 1);
        w.mark_processed(&[fp]);
        assert_eq!(w.unprocessed().len(), 0);
    }

    #[test]
    fn sample_is_deterministic_with_seed() {
        let mut w = Window::new(10, ChronoDuration::minutes(10));
        for i in 0..5 {
            w.push(now(), None, SignalValue::from(i as f64));
        }
        let a = w.sample(3, Some(42));
        let b = w.sample(3, Some(42));
        assert_eq!(
            a.iter().map(|e| e.entity.clone()).collect::<Vec<_>>(),
            b.iter().map(|e| e.entity.clone()).collect::<Vec<_>>()
        );
    }
}
