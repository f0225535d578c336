use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// WindowConfig — deserialized from [window]
// ---------------------------------------------------------------------------

/// Global defaults for a named signal window's retention. Eviction always
/// runs age-first (anything older than `max_age` is dropped), then trims to
/// `max_items` by discarding the oldest remaining entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub max_items: usize,
    pub max_age: HumanDuration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_age: HumanDuration::from(std::time::Duration::from_secs(600)),
        }
    }
}

impl WindowConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.max_items == 0 {
            anyhow::bail!("window.max_items must be > 0");
        }
        if self.max_age.as_duration().is_zero() {
            anyhow::bail!("window.max_age must be > 0");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
