use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::license::LicenseConfig;
use crate::logging::LoggingConfig;
use crate::meter::MeterConfig;
use crate::metrics::MetricsConfig;
use crate::runtime::SchedulerConfig;
use crate::validate;
use crate::window::WindowConfig;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FlowConfigRaw {
    scheduler: SchedulerConfig,
    meter: MeterConfig,
    license: LicenseConfig,
    window: WindowConfig,
    logging: LoggingConfig,
    metrics: MetricsConfig,
}

impl Default for FlowConfigRaw {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            meter: MeterConfig::default(),
            license: LicenseConfig::default(),
            window: WindowConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowConfig (resolved, validated)
// ---------------------------------------------------------------------------

/// Top-level runtime configuration, parsed from a `flow.toml` document.
/// Every section has defaults, so an empty document is a valid
/// (free-tier, unlicensed) configuration.
#[derive(Debug, Clone, Default)]
pub struct FlowConfig {
    pub scheduler: SchedulerConfig,
    pub meter: MeterConfig,
    pub license: LicenseConfig,
    pub window: WindowConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl FlowConfig {
    /// Read and parse a `flow.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for FlowConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a resolved, validated [`FlowConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: FlowConfigRaw = toml::from_str(toml_str)?;

        let config = FlowConfig {
            scheduler: raw.scheduler,
            meter: raw.meter,
            license: raw.license,
            window: raw.window,
            logging: raw.logging,
            metrics: raw.metrics,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
[scheduler]
cycle_depth_limit = 16
quarantine_threshold = 5
atom_timeout = "15s"
coordinator_shutdown_timeout = "30s"
enable_mesh = false
heartbeat_interval = "10s"

[scheduler.lanes]
fast = 4
io = 2
ml = 1
llm = 1

[meter]
window = "60s"
buckets = 60
thresholds = [50, 80, 90, 100]
threshold_hysteresis_pp = 2.0

[license]
vendor_public_key = ""
grace_period = "5m"
free_tier_max_slots = 10
free_tier_max_work_units_per_minute = 1000
free_tier_max_nodes = 3

[window]
max_items = 50
max_age = "5m"

[logging]
level = "debug"

[metrics]
enabled = false
"#;

    #[test]
    fn load_full_toml() {
        let cfg: FlowConfig = FULL_TOML.parse().unwrap();

        assert_eq!(cfg.scheduler.cycle_depth_limit, 16);
        assert_eq!(cfg.scheduler.quarantine_threshold, 5);
        assert_eq!(cfg.scheduler.lanes.fast, 4);

        assert_eq!(cfg.meter.buckets, 60);
        assert_eq!(cfg.meter.thresholds, vec![50, 80, 90, 100]);

        assert_eq!(cfg.license.free_tier_max_slots, 10);

        assert_eq!(cfg.window.max_items, 50);

        assert_eq!(cfg.logging.level, "debug");
        assert!(!cfg.metrics.enabled);
    }

    #[test]
    fn empty_document_is_valid() {
        let cfg: FlowConfig = "".parse().unwrap();
        assert_eq!(cfg.scheduler.lanes.fast, 8);
        assert_eq!(cfg.meter.buckets, 60);
    }

    #[test]
    fn reject_zero_cycle_depth() {
        let toml = FULL_TOML.replace("cycle_depth_limit = 16", "cycle_depth_limit = 0");
        assert!(toml.parse::<FlowConfig>().is_err());
    }

    #[test]
    fn reject_unsorted_thresholds() {
        let toml = FULL_TOML.replace(
            "thresholds = [50, 80, 90, 100]",
            "thresholds = [90, 50, 80, 100]",
        );
        assert!(toml.parse::<FlowConfig>().is_err());
    }

    #[test]
    fn reject_zero_window_items() {
        let toml = FULL_TOML.replace("max_items = 50", "max_items = 0");
        assert!(toml.parse::<FlowConfig>().is_err());
    }
}
