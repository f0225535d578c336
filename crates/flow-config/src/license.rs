use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// LicenseOverridesConfig — deserialized from [license.overrides]
// ---------------------------------------------------------------------------

/// Operator-supplied overrides layered on top of a verified license token.
/// `expiry`, when set, replaces the token's own expiry outright rather than
/// extending it — simplest mental model for an override meant to shorten or
/// lengthen a trial period.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LicenseOverridesConfig {
    pub tier: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub max_slots: Option<usize>,
    pub max_work_units_per_minute: Option<f64>,
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub features: Vec<String>,
}

// ---------------------------------------------------------------------------
// LicenseConfig — deserialized from [license]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Inline license token (signed JSON, base64 or raw).
    pub token: Option<String>,
    /// Path to a file holding the license token. Ignored if `token` is set.
    pub token_file: Option<PathBuf>,
    /// Base64-encoded Ed25519 verifying key used to check token signatures.
    pub vendor_public_key: String,
    pub overrides: LicenseOverridesConfig,
    pub grace_period: HumanDuration,
    /// Tolerance for `issuedAt` appearing slightly in the future relative to
    /// this process's clock.
    pub clock_skew: HumanDuration,
    pub free_tier_max_slots: usize,
    pub free_tier_max_work_units_per_minute: u64,
    pub free_tier_max_nodes: usize,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: None,
            vendor_public_key: String::new(),
            overrides: LicenseOverridesConfig::default(),
            grace_period: HumanDuration::from(std::time::Duration::from_secs(300)),
            clock_skew: HumanDuration::from(std::time::Duration::from_secs(300)),
            free_tier_max_slots: 10,
            free_tier_max_work_units_per_minute: 1000,
            free_tier_max_nodes: 3,
        }
    }
}

impl LicenseConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.token.is_none() && self.token_file.is_none() && self.vendor_public_key.is_empty() {
            // No token source and no key configured means the coordinator
            // falls back to the unlicensed free tier, which is a valid
            // configuration — nothing to validate here.
            return Ok(());
        }
        if !self.vendor_public_key.is_empty() {
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(self.vendor_public_key.trim())
                .map_err(|e| anyhow::anyhow!("license.vendor_public_key is not valid base64: {e}"))?;
            if decoded.len() != 32 {
                anyhow::bail!(
                    "license.vendor_public_key must decode to 32 bytes (Ed25519), got {}",
                    decoded.len()
                );
            }
        }
        if self.grace_period.as_duration().is_zero() {
            anyhow::bail!("license.grace_period must be > 0");
        }
        if self.free_tier_max_slots == 0 {
            anyhow::bail!("license.free_tier_max_slots must be > 0");
        }
        if self.free_tier_max_nodes == 0 {
            anyhow::bail!("license.free_tier_max_nodes must be > 0");
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
    fn defaults_pass_validation() {
        assert!(LicenseConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_base64_key() {
        let cfg = LicenseConfig {
            vendor_public_key: "not base64!!".to_string(),
            ..LicenseConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_wrong_length_key() {
        use base64::Engine;
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        let cfg = LicenseConfig {
            vendor_public_key: short,
            ..LicenseConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_correct_length_key() {
        use base64::Engine;
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let cfg = LicenseConfig {
            vendor_public_key: key,
            ..LicenseConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_grace_period() {
        let cfg = LicenseConfig {
            grace_period: HumanDuration::from(std::time::Duration::ZERO),
            ..LicenseConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_expiry_parses_rfc3339() {
        let toml_str = r#"
tier = "pro"
expiry = "2027-01-01T00:00:00Z"
features = ["atom.llm.*"]
"#;
        let ovr: LicenseOverridesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(ovr.tier.as_deref(), Some("pro"));
        assert!(ovr.expiry.is_some());
        assert_eq!(ovr.features, vec!["atom.llm.*".to_string()]);
    }
}
