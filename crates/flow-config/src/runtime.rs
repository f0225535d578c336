use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// LaneConfig — per-lane concurrency ceilings, deserialized from [scheduler.lanes]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LaneConfig {
    pub fast: usize,
    pub io: usize,
    pub ml: usize,
    pub llm: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            fast: 8,
            io: 4,
            ml: 2,
            llm: 1,
        }
    }
}

impl LaneConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        for (name, n) in [
            ("fast", self.fast),
            ("io", self.io),
            ("ml", self.ml),
            ("llm", self.llm),
        ] {
            if n == 0 {
                anyhow::bail!("scheduler.lanes.{name} must be > 0");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig — deserialized from [scheduler]
// ---------------------------------------------------------------------------

/// Workflow scheduler tuning: lane concurrency, node/coordinator timeouts,
/// cycle-depth bound and quarantine policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub lanes: LaneConfig,
    pub atom_timeout: HumanDuration,
    pub coordinator_shutdown_timeout: HumanDuration,
    /// Maximum number of hops a trigger chain may traverse before the
    /// scheduler treats the workflow graph as cyclic and refuses to run it.
    pub cycle_depth_limit: u32,
    /// Consecutive atom failures on a node before it is quarantined.
    pub quarantine_threshold: u32,
    pub enable_mesh: bool,
    pub heartbeat_interval: HumanDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lanes: LaneConfig::default(),
            atom_timeout: HumanDuration::from(std::time::Duration::from_secs(30)),
            coordinator_shutdown_timeout: HumanDuration::from(std::time::Duration::from_secs(60)),
            cycle_depth_limit: 32,
            quarantine_threshold: 5,
            enable_mesh: false,
            heartbeat_interval: HumanDuration::from(std::time::Duration::from_secs(30)),
        }
    }
}

impl SchedulerConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        self.lanes.validate()?;
        if self.atom_timeout.as_duration().is_zero() {
            anyhow::bail!("scheduler.atom_timeout must be > 0");
        }
        if self.coordinator_shutdown_timeout.as_duration().is_zero() {
            anyhow::bail!("scheduler.coordinator_shutdown_timeout must be > 0");
        }
        if self.cycle_depth_limit == 0 {
            anyhow::bail!("scheduler.cycle_depth_limit must be > 0");
        }
        if self.quarantine_threshold == 0 {
            anyhow::bail!("scheduler.quarantine_threshold must be > 0");
        }
        if self.heartbeat_interval.as_duration().is_zero() {
            anyhow::bail!("scheduler.heartbeat_interval must be > 0");
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
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.lanes.fast, 8);
        assert_eq!(cfg.lanes.io, 4);
        assert_eq!(cfg.lanes.ml, 2);
        assert_eq!(cfg.lanes.llm, 1);
        assert_eq!(cfg.cycle_depth_limit, 32);
        assert!(!cfg.enable_mesh);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_lane() {
        let cfg = SchedulerConfig {
            lanes: LaneConfig { fast: 0, ..LaneConfig::default() },
            ..SchedulerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_cycle_depth() {
        let cfg = SchedulerConfig {
            cycle_depth_limit: 0,
            ..SchedulerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_quarantine_threshold() {
        let cfg = SchedulerConfig {
            quarantine_threshold: 0,
            ..SchedulerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
