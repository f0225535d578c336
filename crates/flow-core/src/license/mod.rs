mod manager;
mod state;
mod token;

pub use manager::LicenseManager;
pub use state::{derive_state, LicenseState, EXPIRING_SOON_WINDOW};
pub use token::{has_feature, LicenseLimits, LicenseTokenPayload, SignedLicenseToken, Tier};
