use crate::config::FlowConfig;

/// Internal validation, called automatically during `FlowConfig::from_str` / `load`.
pub(crate) fn validate(config: &FlowConfig) -> anyhow::Result<()> {
    config.scheduler.validate()?;
    config.meter.validate()?;
    config.license.validate()?;
    config.window.validate()?;
    config.metrics.validate()?;

    if config.license.token.is_some() && config.license.token_file.is_some() {
        anyhow::bail!("license.token and license.token_file are mutually exclusive");
    }

    // A per-minute free-tier budget smaller than the meter's own window
    // would make every bucket immediately over budget; reject that as a
    // misconfiguration rather than silently throttling everything.
    if config.license.free_tier_max_work_units_per_minute == 0 {
        anyhow::bail!("license.free_tier_max_work_units_per_minute must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;

    #[test]
    fn defaults_validate() {
        let cfg = FlowConfig::default();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn rejects_both_token_sources() {
        let mut cfg = FlowConfig::default();
        cfg.license.token = Some("abc".to_string());
        cfg.license.token_file = Some("license.json".into());
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_zero_free_tier_budget() {
        let mut cfg = FlowConfig::default();
        cfg.license.free_tier_max_work_units_per_minute = 0;
        assert!(validate(&cfg).is_err());
    }
}
