use std::sync::Arc;

use flow_core::atom::Lane;
use flow_config::LaneConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One fair FIFO admission queue per lane. An atom waiting here does not
/// count against the license budget until it holds a permit — the gate
/// check happens only after `acquire` returns.
pub struct LaneSemaphores {
    fast: Arc<Semaphore>,
    io: Arc<Semaphore>,
    ml: Arc<Semaphore>,
    llm: Arc<Semaphore>,
}

impl LaneSemaphores {
    pub fn new(config: &LaneConfig) -> Self {
        Self {
            fast: Arc::new(Semaphore::new(config.fast)),
            io: Arc::new(Semaphore::new(config.io)),
            ml: Arc::new(Semaphore::new(config.ml)),
            llm: Arc::new(Semaphore::new(config.llm)),
        }
    }

    fn semaphore(&self, lane: Lane) -> &Arc<Semaphore> {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Io => &self.io,
            Lane::Ml => &self.ml,
            Lane::Llm => &self.llm,
        }
    }

    /// Suspends until a slot in `lane` is free. The semaphore's own FIFO
    /// wait queue gives admission order among waiters.
    pub async fn acquire(&self, lane: Lane) -> OwnedSemaphorePermit {
        self.semaphore(lane)
            .clone()
            .acquire_owned()
            .await
            .expect("lane semaphore is never closed")
    }

    pub fn label(lane: Lane) -> &'static str {
        match lane {
            Lane::Fast => "fast",
            Lane::Io => "io",
            Lane::Ml => "ml",
            Lane::Llm => "llm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_per_lane_capacity() {
        let lanes = LaneSemaphores::new(&LaneConfig { fast: 1, io: 1, ml: 1, llm: 1 });
        let permit = lanes.acquire(Lane::Fast).await;
        assert_eq!(lanes.fast.available_permits(), 0);
        drop(permit);
        assert_eq!(lanes.fast.available_permits(), 1);
    }

    #[test]
    fn label_matches_lane() {
        assert_eq!(LaneSemaphores::label(Lane::Llm), "llm");
    }
}
