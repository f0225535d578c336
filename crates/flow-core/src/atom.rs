use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreResult;
use crate::ext::{Clock, LlmAdapter, StorageAdapter};
use crate::gate::LicensePolicy;
use crate::signal::Signal;
use crate::sink::SignalSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AtomKind {
    Sensor,
    Extractor,
    Analyzer,
    Proposer,
    Constrainer,
    Renderer,
    Shaper,
    Coordinator,
}

/// An atom's declared read/write surface and execution properties.
/// `reads` may contain `"*"` to mean "any signal".
#[derive(Debug, Clone)]
pub struct AtomContract {
    pub name: String,
    pub kind: AtomKind,
    pub deterministic: bool,
    pub persistent: bool,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub license: LicensePolicy,
    pub lane: Lane,
}

impl AtomContract {
    /// Whether this contract's `reads` admits the given signal name.
    pub fn reads_signal(&self, name: &str) -> bool {
        self.reads.iter().any(|r| r == "*" || r == name)
    }

    pub fn writes_signal(&self, name: &str) -> bool {
        self.writes.iter().any(|w| w == "*" || w == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Fast,
    Io,
    Ml,
    Llm,
}

/// Services reachable from inside an atom: clock, storage, LLM adapter.
/// Handed to every invocation through [`RunContext`].
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub storage: Option<Arc<dyn StorageAdapter>>,
    pub llm: Option<Arc<dyn LlmAdapter>>,
}

/// Per-invocation execution context: identifies the run and node, and
/// carries the node's resolved configuration, external services, and the
/// sink (so window-reading atoms — reducers, scorers — can query the
/// named windows their config points at).
pub struct RunContext {
    pub run_id: String,
    pub node_id: String,
    pub config: serde_json::Value,
    pub services: Arc<Services>,
    pub sink: Arc<SignalSink>,
}

impl RunContext {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(|v| v.as_f64())
    }
}

/// The executable behavior bound to an [`AtomContract`] in the registry.
/// `inputs` are the signals that triggered this invocation (one per
/// distinct triggering signal name); `run` returns the signals to emit.
#[async_trait]
pub trait Atom: Send + Sync {
    async fn run(&self, ctx: &RunContext, inputs: &[Signal]) -> CoreResult<Vec<Signal>>;
}
