use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// MeterConfig — deserialized from [meter]
// ---------------------------------------------------------------------------

/// Work-unit meter tuning: the rolling window size and bucket count used to
/// track consumption, plus the percentage thresholds that raise
/// `onWorkUnitThreshold` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MeterConfig {
    pub window: HumanDuration,
    pub buckets: usize,
    pub thresholds: Vec<u8>,
    /// Percentage points a threshold must drop below its crossing point
    /// before it is allowed to re-fire. Prevents re-raising the same
    /// threshold event on every bucket while usage oscillates around it.
    pub threshold_hysteresis_pp: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            window: HumanDuration::from(std::time::Duration::from_secs(60)),
            buckets: 60,
            thresholds: vec![50, 80, 90, 100],
            threshold_hysteresis_pp: 2.0,
        }
    }
}

impl MeterConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.window.as_duration().is_zero() {
            anyhow::bail!("meter.window must be > 0");
        }
        if self.buckets == 0 {
            anyhow::bail!("meter.buckets must be > 0");
        }
        for t in &self.thresholds {
            if *t == 0 || *t > 100 {
                anyhow::bail!("meter.thresholds entries must be in 1..=100, got {t}");
            }
        }
        let mut sorted = self.thresholds.clone();
        sorted.sort_unstable();
        if sorted != self.thresholds {
            anyhow::bail!("meter.thresholds must be listed in ascending order");
        }
        if self.threshold_hysteresis_pp < 0.0 || self.threshold_hysteresis_pp > 100.0 {
            anyhow::bail!("meter.threshold_hysteresis_pp must be in 0..=100");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = MeterConfig::default();
        assert_eq!(cfg.buckets, 60);
        assert_eq!(cfg.thresholds, vec![50, 80, 90, 100]);
        assert_eq!(cfg.threshold_hysteresis_pp, 2.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_buckets() {
        let cfg = MeterConfig {
            buckets: 0,
            ..MeterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_threshold_over_100() {
        let cfg = MeterConfig {
            thresholds: vec![50, 150],
            ..MeterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unsorted_thresholds() {
        let cfg = MeterConfig {
            thresholds: vec![90, 50],
            ..MeterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_hysteresis() {
        let cfg = MeterConfig {
            threshold_hysteresis_pp: -1.0,
            ..MeterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
