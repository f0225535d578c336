use std::collections::HashMap;
use std::sync::Arc;

use crate::atom::{Atom, AtomContract};
use crate::error::{CoreError, CoreReason};

struct Entry {
    contract: AtomContract,
    executor: Arc<dyn Atom>,
}

/// Maps atom names to their contract and executor. Contracts are immutable
/// once registered — a second `register` call for the same name replaces
/// the executor but is rejected if the contract differs, since a changing
/// contract at runtime would invalidate workflows already validated
/// against it.
#[derive(Default)]
pub struct AtomRegistry {
    entries: HashMap<String, Entry>,
}

impl AtomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        contract: AtomContract,
        executor: Arc<dyn Atom>,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self.entries.get(&contract.name) {
            if existing.contract.name != contract.name
                || existing.contract.kind != contract.kind
                || existing.contract.reads != contract.reads
                || existing.contract.writes != contract.writes
            {
                return Err(CoreError::from(CoreReason::InvalidWorkflow(format!(
                    "atom {} already registered with a different contract",
                    contract.name
                ))));
            }
        }
        self.entries.insert(
            contract.name.clone(),
            Entry { contract, executor },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<(&AtomContract, Arc<dyn Atom>), CoreError> {
        self.entries
            .get(name)
            .map(|e| (&e.contract, e.executor.clone()))
            .ok_or_else(|| CoreError::from(CoreReason::UnknownAtom(name.to_string())))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{AtomKind, Lane, RunContext};
    use crate::error::CoreResult;
    use crate::gate::LicensePolicy;
    use crate::signal::Signal;
    use async_trait::async_trait;

    struct NoopAtom;

    #[async_trait]
    impl Atom for NoopAtom {
        async fn run(&self, _ctx: &RunContext, _inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
            Ok(vec![])
        }
    }

    fn contract(name: &str) -> AtomContract {
        AtomContract {
            name: name.to_string(),
            kind: AtomKind::Sensor,
            deterministic: true,
            persistent: false,
            reads: vec!["*".into()],
            writes: vec!["x".into()],
            license: LicensePolicy::default(),
            lane: Lane::Fast,
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = AtomRegistry::new();
        reg.register(contract("sensor.a"), Arc::new(NoopAtom)).unwrap();
        let (c, _exec) = reg.get("sensor.a").unwrap();
        assert_eq!(c.name, "sensor.a");
    }

    #[test]
    fn missing_atom_is_unknown_atom() {
        let reg = AtomRegistry::new();
        let err = reg.get("missing").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown atom"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn re_registering_same_contract_replaces_executor() {
        let mut reg = AtomRegistry::new();
        reg.register(contract("sensor.a"), Arc::new(NoopAtom)).unwrap();
        reg.register(contract("sensor.a"), Arc::new(NoopAtom)).unwrap();
        assert!(reg.contains("sensor.a"));
    }

    #[test]
    fn changing_contract_on_reregister_is_rejected() {
        let mut reg = AtomRegistry::new();
        reg.register(contract("sensor.a"), Arc::new(NoopAtom)).unwrap();
        let mut changed = contract("sensor.a");
        changed.writes = vec!["y".into()];
        assert!(reg.register(changed, Arc::new(NoopAtom)).is_err());
    }
}
