use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dynamically-typed signal payload. Round-trips through `serde_json::Value`
/// so atoms and reducers written against it can move freely between the
/// wire format and in-process values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Sequence(Vec<SignalValue>),
    Record(BTreeMap<String, SignalValue>),
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[SignalValue]> {
        match self {
            Self::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, SignalValue>> {
        match self {
            Self::Record(m) => Some(m),
            _ => None,
        }
    }
}

impl From<f64> for SignalValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for SignalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<serde_json::Value> for SignalValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(a) => Self::Sequence(a.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(o) => {
                Self::Record(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// An immutable record appended to a [`crate::sink::SignalSink`]. Once
/// appended a signal is never mutated; `emittedAt` is monotonic per sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub run_id: String,
    pub source: String,
    /// Dot-delimited path, e.g. `sentiment.score`.
    pub name: String,
    /// Optional correlation token.
    pub key: Option<String>,
    pub value: SignalValue,
    pub confidence: f64,
    pub emitted_at: DateTime<Utc>,
    /// Monotonic sequence number assigned by the sink at append time; used
    /// to order signals sharing the same wall-clock timestamp.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Signal {
    pub fn new(
        run_id: impl Into<String>,
        source: impl Into<String>,
        name: impl Into<String>,
        value: SignalValue,
        emitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source: source.into(),
            name: name.into(),
            key: None,
            value,
            confidence: 1.0,
            emitted_at,
            seq: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// An entry stored in a named sliding window. `fingerprint` is a stable hash
/// over the entity content used for grouping. `collected_at` goes through the
/// injectable [`crate::ext::Clock`] like every other externally-visible
/// timestamp in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEntry {
    pub key: Option<String>,
    pub entity: SignalValue,
    pub fingerprint: u64,
    pub collected_at: DateTime<Utc>,
    pub processed: bool,
}

/// Stable hash over an entity's canonical JSON form, used as a
/// [`WindowEntry::fingerprint`] for grouping.
pub fn fingerprint_of(value: &SignalValue) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    serde_json::to_string(value)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

/// Stats derived on demand from a window snapshot; never cached across
/// mutations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub timespan_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_value_roundtrip() {
        let v = serde_json::json!({"a": 1.0, "b": [1.0, "x", true, null]});
        let sv: SignalValue = v.into();
        match &sv {
            SignalValue::Record(m) => {
                assert_eq!(m["a"], SignalValue::Number(1.0));
                assert_eq!(
                    m["b"],
                    SignalValue::Sequence(vec![
                        SignalValue::Number(1.0),
                        SignalValue::Text("x".into()),
                        SignalValue::Bool(true),
                        SignalValue::Null,
                    ])
                );
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn signal_builder() {
        let now = Utc::now();
        let s = Signal::new("run1", "atomA", "sentiment.score", 0.8.into(), now)
            .with_key("doc1")
            .with_confidence(0.9);
        assert_eq!(s.key.as_deref(), Some("doc1"));
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.value.as_f64(), Some(0.8));
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = SignalValue::from("same");
        let b = SignalValue::from("same");
        let c = SignalValue::from("different");
        assert_eq!(fingerprint_of(&a), fingerprint_of(&b));
        assert_ne!(fingerprint_of(&a), fingerprint_of(&c));
    }
}
