use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ext::Signer;

/// Ordered license tier lattice: `free < starter < professional < enterprise`.
/// Declaration order is the derived `Ord` — do not reorder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseLimits {
    pub max_slots: usize,
    pub max_work_units_per_minute: f64,
    pub max_nodes: usize,
}

/// The signed body of a license token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseTokenPayload {
    pub license_id: String,
    pub issued_to: String,
    pub issued_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub tier: Tier,
    pub features: Vec<String>,
    pub limits: LicenseLimits,
}

impl LicenseTokenPayload {
    /// Trailing-wildcard feature match, e.g. pattern `"documents.*"` matches
    /// id `"documents.convert"`.
    pub fn has_feature(&self, id: &str) -> bool {
        has_feature(&self.features, id)
    }
}

pub fn has_feature(features: &[String], id: &str) -> bool {
    features.iter().any(|f| match f.strip_suffix('*') {
        Some(prefix) => id.starts_with(prefix),
        None => f == id,
    })
}

/// Wire format: the payload plus a base64-encoded Ed25519 signature over the
/// payload's canonical JSON encoding (keys sorted, no whitespace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedLicenseToken {
    #[serde(flatten)]
    pub payload: LicenseTokenPayload,
    pub signature: String,
}

impl SignedLicenseToken {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Canonical bytes signed over: `serde_json::Value`'s default map type is
    /// key-sorted when the `preserve_order` feature is off, so serializing
    /// through `Value` gives the sorted, whitespace-free form the signature
    /// covers.
    pub fn canonical_payload_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let value = serde_json::to_value(&self.payload)?;
        serde_json::to_vec(&value)
    }

    pub fn verify(&self, signer: &dyn Signer, vendor_public_key: &[u8]) -> bool {
        use base64::Engine;
        let Ok(sig_bytes) = base64::engine::general_purpose::STANDARD.decode(&self.signature)
        else {
            return false;
        };
        let Ok(bytes) = self.canonical_payload_bytes() else {
            return false;
        };
        signer.verify(&bytes, &sig_bytes, vendor_public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::Ed25519Signer;
    use ed25519_dalek::{Signer as _, SigningKey};

    fn sample_payload() -> LicenseTokenPayload {
        LicenseTokenPayload {
            license_id: "lic-1".into(),
            issued_to: "acme".into(),
            issued_at: Utc::now() - chrono::Duration::hours(1),
            expiry: Utc::now() + chrono::Duration::days(30),
            tier: Tier::Professional,
            features: vec!["documents.*".into(), "search.bm25".into()],
            limits: LicenseLimits {
                max_slots: 20,
                max_work_units_per_minute: 500.0,
                max_nodes: 50,
            },
        }
    }

    fn signed_with_key(payload: LicenseTokenPayload, key: &SigningKey) -> SignedLicenseToken {
        let mut token = SignedLicenseToken {
            payload,
            signature: String::new(),
        };
        let bytes = token.canonical_payload_bytes().unwrap();
        let sig = key.sign(&bytes);
        use base64::Engine;
        token.signature = base64::engine::general_purpose::STANDARD.encode(sig.to_bytes());
        token
    }

    #[test]
    fn tier_lattice_ordering() {
        assert!(Tier::Free < Tier::Starter);
        assert!(Tier::Starter < Tier::Professional);
        assert!(Tier::Professional < Tier::Enterprise);
    }

    #[test]
    fn feature_wildcard_matches_prefix() {
        let features = vec!["documents.*".to_string()];
        assert!(has_feature(&features, "documents.convert"));
        assert!(!has_feature(&features, "search.bm25"));
    }

    #[test]
    fn feature_exact_match() {
        let features = vec!["search.bm25".to_string()];
        assert!(has_feature(&features, "search.bm25"));
        assert!(!has_feature(&features, "search.rrf"));
    }

    #[test]
    fn verify_accepts_valid_signature() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let token = signed_with_key(sample_payload(), &key);
        let signer = Ed25519Signer;
        assert!(token.verify(&signer, key.verifying_key().as_bytes()));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let mut token = signed_with_key(sample_payload(), &key);
        token.payload.tier = Tier::Enterprise;
        let signer = Ed25519Signer;
        assert!(!token.verify(&signer, key.verifying_key().as_bytes()));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let other = SigningKey::generate(&mut rand::thread_rng());
        let token = signed_with_key(sample_payload(), &key);
        let signer = Ed25519Signer;
        assert!(!token.verify(&signer, other.verifying_key().as_bytes()));
    }

    #[test]
    fn round_trip_parse() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let token = signed_with_key(sample_payload(), &key);
        let json = serde_json::to_string(&token).unwrap();
        let parsed = SignedLicenseToken::parse(&json).unwrap();
        assert_eq!(parsed.payload, token.payload);
        assert_eq!(parsed.signature, token.signature);
    }
}
