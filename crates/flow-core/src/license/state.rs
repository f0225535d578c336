use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::token::LicenseTokenPayload;

/// Window before expiry in which a valid license is reported `ExpiringSoon`.
/// Not part of the enumerated external configuration; a fixed operational
/// default is reasonable since it only affects a dashboard-facing signal.
pub const EXPIRING_SOON_WINDOW: ChronoDuration = ChronoDuration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LicenseState {
    Unlicensed,
    Valid,
    ExpiringSoon,
    Expired,
    InGrace,
    Revoked,
    FreeTier,
    Invalid,
}

/// Pure derivation of [`LicenseState`] from a token and the validation
/// inputs gathered by the manager. No token present yields `FreeTier`
/// (terminal unless a token is later loaded).
#[allow(clippy::too_many_arguments)]
pub fn derive_state(
    token: Option<&LicenseTokenPayload>,
    signature_valid: bool,
    revoked: bool,
    now: DateTime<Utc>,
    grace: ChronoDuration,
    clock_skew: ChronoDuration,
) -> LicenseState {
    let Some(token) = token else {
        return LicenseState::FreeTier;
    };

    if revoked {
        return LicenseState::Revoked;
    }
    if !signature_valid {
        return LicenseState::Invalid;
    }
    if token.issued_at > now + clock_skew {
        return LicenseState::Invalid;
    }

    if now <= token.expiry {
        if token.expiry - now <= EXPIRING_SOON_WINDOW {
            return LicenseState::ExpiringSoon;
        }
        return LicenseState::Valid;
    }

    // Past expiry: without a grace period the license simply stays Expired;
    // with one it passes through InGrace and finally to Unlicensed once the
    // grace period elapses.
    if grace <= ChronoDuration::zero() {
        return LicenseState::Expired;
    }
    if now <= token.expiry + grace {
        return LicenseState::InGrace;
    }

    LicenseState::Unlicensed
}
