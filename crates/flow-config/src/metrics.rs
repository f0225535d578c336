use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// Runtime metrics settings.
///
/// When disabled, metrics collection/export is skipped entirely.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub report_interval: HumanDuration,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            report_interval: HumanDuration::from(std::time::Duration::from_secs(2)),
            listen_addr: "127.0.0.1:9901".to_string(),
        }
    }
}

impl MetricsConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.report_interval.as_duration().is_zero() {
            anyhow::bail!("metrics.report_interval must be > 0");
        }
        if self.enabled && self.listen_addr.trim().is_empty() {
            anyhow::bail!("metrics.listen_addr must be non-empty when metrics.enabled=true");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disabled() {
        let cfg = MetricsConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_interval() {
        let cfg = MetricsConfig {
            report_interval: HumanDuration::from(std::time::Duration::ZERO),
            ..MetricsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_listen_addr_when_enabled() {
        let cfg = MetricsConfig {
            enabled: true,
            listen_addr: String::new(),
            ..MetricsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
