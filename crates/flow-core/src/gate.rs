use std::time::Instant;

use crate::license::{LicenseManager, Tier};
use crate::meter::{ThresholdEvent, WorkUnitMeter};

/// Per-atom licensing policy consulted by the gate. Bundled with an atom's
/// contract at registration time (see [`crate::atom::AtomContract`]).
#[derive(Debug, Clone)]
pub struct LicensePolicy {
    pub minimum_tier: Tier,
    pub required_features: Vec<String>,
    /// When a tier or feature check fails, degrade instead of denying
    /// outright: emit a degraded signal and return `DegradedSkip`.
    pub allow_free_tier_degradation: bool,
    pub budget_base: f64,
    pub budget_per_kb: f64,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            minimum_tier: Tier::Free,
            required_features: Vec::new(),
            allow_free_tier_degradation: true,
            budget_base: 1.0,
            budget_per_kb: 0.0,
        }
    }
}

impl LicensePolicy {
    pub fn cost(&self, size_kb: f64) -> f64 {
        self.budget_base + self.budget_per_kb * size_kb
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Admitted at the given cost; any meter threshold events crossed by
    /// this admission are carried along so the caller can surface them
    /// (the coordinator turns them into `workunit.threshold` signals).
    Admitted(f64, Vec<ThresholdEvent>),
    DegradedSkip,
    Throttled,
    LicenseRequired,
}

/// Runs the three-check admission sequence: tier, then features, then
/// budget. The first two share a degradation policy; the budget check never
/// degrades — a denied budget is always `Throttled`.
pub fn check(
    manager: &LicenseManager,
    meter: &WorkUnitMeter,
    policy: &LicensePolicy,
    atom_type: &str,
    now: Instant,
    size_kb: f64,
) -> GateDecision {
    if !manager.meets_tier_requirement(policy.minimum_tier) {
        return if policy.allow_free_tier_degradation {
            GateDecision::DegradedSkip
        } else {
            GateDecision::LicenseRequired
        };
    }

    if !policy
        .required_features
        .iter()
        .all(|f| manager.has_feature(f))
    {
        return if policy.allow_free_tier_degradation {
            GateDecision::DegradedSkip
        } else {
            GateDecision::LicenseRequired
        };
    }

    let cost = policy.cost(size_kb);
    match meter.check_and_record(now, cost, Some(atom_type)) {
        Some(events) => GateDecision::Admitted(cost, events),
        None => GateDecision::Throttled,
    }
}
