use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;

/// Result of storing bytes through a [`StorageAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
    pub hash: String,
}

/// External object storage, reached by renderer/shaper atoms. Out of scope
/// for this crate's own implementation; hosts provide a concrete adapter.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn store_bytes(&self, path: &str, mime: &str, bytes: &[u8]) -> CoreResult<StoredObject>;
    async fn store_text(
        &self,
        path: &str,
        text: &str,
        mime: &str,
        meta: Option<&str>,
    ) -> CoreResult<StoredObject>;
    async fn get_local_path(&self, path: &str) -> CoreResult<String>;
}

/// Result of an LLM sentiment analysis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentResult {
    pub label: String,
    pub score: f64,
    pub confidence: f64,
}

/// External LLM client, reached by proposer atoms. The core treats failures
/// as `atom.error` with no retry policy of its own.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn generate(&self, prompt: &str) -> CoreResult<String>;
    async fn analyze_sentiment(&self, text: &str) -> CoreResult<SentimentResult>;
}

/// Injectable wall clock. Every externally-visible timestamp in the crate
/// goes through this trait rather than calling `Utc::now()` directly, so
/// tests can hold time fixed.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed to a single instant, advanced explicitly by tests.
pub struct FixedClock {
    now: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.now.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).expect("fixed clock millis always valid")
    }
}

/// Ed25519 verification (and, for test fixtures only, signing) over a
/// canonicalized license token payload.
pub trait Signer: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl Signer for Ed25519Signer {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};

        let Ok(key_bytes): Result<[u8; 32], _> = public_key.try_into() else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes): Result<[u8; 64], _> = signature.try_into() else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// In-memory storage double used by this crate's own tests.
#[derive(Debug, Default)]
pub struct NullStorage;

#[async_trait]
impl StorageAdapter for NullStorage {
    async fn store_bytes(&self, path: &str, _mime: &str, bytes: &[u8]) -> CoreResult<StoredObject> {
        Ok(StoredObject {
            path: path.to_string(),
            size: bytes.len() as u64,
            hash: format!("{:x}", bytes.len()),
        })
    }

    async fn store_text(
        &self,
        path: &str,
        text: &str,
        _mime: &str,
        _meta: Option<&str>,
    ) -> CoreResult<StoredObject> {
        Ok(StoredObject {
            path: path.to_string(),
            size: text.len() as u64,
            hash: format!("{:x}", text.len()),
        })
    }

    async fn get_local_path(&self, path: &str) -> CoreResult<String> {
        Ok(path.to_string())
    }
}
