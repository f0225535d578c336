use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use flow_config::SchedulerConfig;
use flow_core::atom::{Atom, RunContext, Services};
use flow_core::gate::{self, GateDecision};
use flow_core::license::LicenseManager;
use flow_core::meter::WorkUnitMeter;
use flow_core::registry::AtomRegistry;
use flow_core::signal::{Signal, SignalValue};
use flow_core::sink::SignalSink;
use flow_core::workflow::{CompiledWorkflow, TriggerMode};
use orion_error::prelude::*;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeResult;
use crate::lane::LaneSemaphores;
use crate::metrics::RuntimeMetrics;

pub const SIG_ATOM_ERROR: &str = "atom.error";
pub const SIG_ATOM_THROTTLED: &str = "atom.throttled";
pub const SIG_ATOM_QUARANTINED: &str = "atom.quarantined";
pub const SIG_ATOM_DEGRADED: &str = "atom.degraded";
pub const SIG_LICENSE_REQUIRED: &str = "license.required";
pub const SIG_WORKUNIT_THRESHOLD: &str = "workunit.threshold";
pub const SIG_ATOM_RESET: &str = "atom.reset";

/// Per-node bookkeeping: the serial execution lock, coalesced pending
/// triggers keyed by signal name (most-recent-wins), and the rolling
/// failure window that drives quarantine.
struct NodeRuntime {
    node_id: String,
    atom_name: String,
    config: serde_json::Value,
    trigger_mode: TriggerMode,
    trigger_names: Vec<String>,
    lock: AsyncMutex<()>,
    pending: SyncMutex<HashMap<String, Signal>>,
    failures: SyncMutex<VecDeque<Instant>>,
    quarantined: AtomicBool,
}

impl NodeRuntime {
    fn can_fire(&self, pending: &HashMap<String, Signal>) -> bool {
        if pending.is_empty() {
            return false;
        }
        match self.trigger_mode {
            TriggerMode::Any => true,
            TriggerMode::All => self.trigger_names.iter().all(|n| pending.contains_key(n)),
        }
    }
}

struct SchedulerShared {
    run_id: String,
    compiled: CompiledWorkflow,
    registry: Arc<AtomRegistry>,
    sink: Arc<SignalSink>,
    license: Arc<LicenseManager>,
    meter: Arc<WorkUnitMeter>,
    lanes: Arc<LaneSemaphores>,
    services: Arc<Services>,
    config: SchedulerConfig,
    metrics: Option<Arc<RuntimeMetrics>>,
    cancel: CancellationToken,
    nodes: HashMap<String, Arc<NodeRuntime>>,
    wildcard_node_ids: Vec<String>,
    cycle_depth: SyncMutex<HashMap<String, u32>>,
}

impl SchedulerShared {
    fn emit(&self, signal: Signal) {
        let now = self.services.clock.now();
        if let Some(m) = &self.metrics {
            m.inc_signal_emitted();
        }
        self.sink.emit(signal, now);
    }

    fn system_signal(&self, name: &str, key: Option<String>, value: SignalValue) -> Signal {
        let now = self.services.clock.now();
        let mut s = Signal::new(self.run_id.clone(), "scheduler", name, value, now);
        if let Some(k) = key {
            s = s.with_key(k);
        }
        s
    }
}

/// The workflow-graph interpreter. Reacts to every emitted signal, admits
/// atoms through their lane and the license gate, and enforces the
/// one-invocation-per-node rule with coalesced re-firing.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    _sub: flow_core::sink::SubscriptionHandle,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        compiled: CompiledWorkflow,
        registry: Arc<AtomRegistry>,
        sink: Arc<SignalSink>,
        license: Arc<LicenseManager>,
        meter: Arc<WorkUnitMeter>,
        services: Arc<Services>,
        config: SchedulerConfig,
        metrics: Option<Arc<RuntimeMetrics>>,
        cancel: CancellationToken,
    ) -> RuntimeResult<Self> {
        let lanes = Arc::new(LaneSemaphores::new(&config.lanes));

        let mut nodes = HashMap::new();
        let mut wildcard_node_ids = Vec::new();
        for node in &compiled.definition.nodes {
            let (contract, _) = registry.get(&node.atom_name).err_conv()?;
            if contract.reads.iter().any(|r| r == "*") {
                wildcard_node_ids.push(node.id.clone());
            }
            let trigger = compiled.triggers.get(&node.id);
            nodes.insert(
                node.id.clone(),
                Arc::new(NodeRuntime {
                    node_id: node.id.clone(),
                    atom_name: node.atom_name.clone(),
                    config: node.config.clone(),
                    trigger_mode: node.trigger_mode,
                    trigger_names: trigger.map(|t| t.signal_names.clone()).unwrap_or_default(),
                    lock: AsyncMutex::new(()),
                    pending: SyncMutex::new(HashMap::new()),
                    failures: SyncMutex::new(VecDeque::new()),
                    quarantined: AtomicBool::new(false),
                }),
            );
        }

        let (tx, signal_rx) = mpsc::unbounded_channel();
        let sub = sink.subscribe_sync(Arc::new(move |signal: &Signal| {
            let _ = tx.send(signal.clone());
        }));

        let shared = Arc::new(SchedulerShared {
            run_id: run_id.into(),
            compiled,
            registry,
            sink,
            license,
            meter,
            lanes,
            services,
            config,
            metrics,
            cancel,
            nodes,
            wildcard_node_ids,
            cycle_depth: SyncMutex::new(HashMap::new()),
        });

        Ok(Self { shared, signal_rx, _sub: sub })
    }

    /// Runs the dispatch loop until cancelled, then drains whatever is
    /// still queued on the signal channel before returning. The coordinator
    /// calls this as the last step of its own shutdown: cancel, drain,
    /// release the sink.
    pub async fn run(mut self) -> RuntimeResult<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => {
                    while let Ok(signal) = self.signal_rx.try_recv() {
                        self.route(signal);
                    }
                    break;
                }
                maybe_signal = self.signal_rx.recv() => {
                    match maybe_signal {
                        Some(signal) => self.route(signal),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    fn route(&self, signal: Signal) {
        if signal.name == SIG_ATOM_RESET {
            if let Some(target) = signal.key.clone().or_else(|| signal.value.as_str().map(String::from)) {
                if let Some(node) = self.shared.nodes.get(&target) {
                    node.quarantined.store(false, AtomicOrdering::SeqCst);
                    node.failures.lock().clear();
                    flow_info!(sched, node = %target, "node reset from quarantine");
                }
            }
        }

        let mut targets: Vec<String> = self
            .shared
            .compiled
            .emitters
            .get(&signal.name)
            .cloned()
            .unwrap_or_default();
        for wid in &self.shared.wildcard_node_ids {
            if !targets.contains(wid) {
                targets.push(wid.clone());
            }
        }

        for target in targets {
            self.merge_and_maybe_dispatch(&signal, target);
        }
    }

    fn merge_and_maybe_dispatch(&self, signal: &Signal, node_id: String) {
        let Some(node) = self.shared.nodes.get(&node_id).cloned() else {
            return;
        };
        if node.quarantined.load(AtomicOrdering::SeqCst) {
            return;
        }

        let is_cycle_edge = self
            .shared
            .compiled
            .cycle_edges
            .contains(&(signal.source.clone(), node_id.clone()));
        if is_cycle_edge {
            let mut depth = self.shared.cycle_depth.lock();
            let entry = depth.entry(node_id.clone()).or_insert(0);
            *entry += 1;
            if *entry > self.shared.config.cycle_depth_limit {
                flow_warn!(sched, node = %node_id, "cycle depth limit exceeded, dropping trigger");
                return;
            }
        }

        let should_attempt = {
            let mut pending = node.pending.lock();
            pending.insert(signal.name.clone(), signal.clone());
            node.can_fire(&pending)
        };
        if !should_attempt {
            return;
        }

        let shared = self.shared.clone();
        tokio::spawn(async move {
            dispatch_node(shared, node).await;
        });
    }
}

/// Tries the per-node serial lock non-blocking; on success, drains the
/// coalesced pending set and runs the admission sequence, then checks once
/// more for anything that coalesced in while it ran (at most one extra
/// firing, never a loop).
async fn dispatch_node(shared: Arc<SchedulerShared>, node: Arc<NodeRuntime>) {
    let Ok(_guard) = node.lock.try_lock() else {
        return;
    };

    let first_inputs: Vec<Signal> = {
        let mut pending = node.pending.lock();
        if !node.can_fire(&pending) {
            return;
        }
        pending.drain().map(|(_, v)| v).collect()
    };
    fire_once(&shared, &node, first_inputs).await;

    let has_more = {
        let pending = node.pending.lock();
        node.can_fire(&pending)
    };
    if has_more {
        let second_inputs: Vec<Signal> = {
            let mut pending = node.pending.lock();
            pending.drain().map(|(_, v)| v).collect()
        };
        fire_once(&shared, &node, second_inputs).await;
    }
}

async fn fire_once(shared: &Arc<SchedulerShared>, node: &Arc<NodeRuntime>, inputs: Vec<Signal>) {
    let (lane, policy, atom) = {
        let Ok((contract, atom)) = shared.registry.get(&node.atom_name) else {
            return;
        };
        (contract.lane, contract.license.clone(), atom)
    };
    let lane_label = LaneSemaphores::label(lane);

    let permit = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => return,
        permit = shared.lanes.acquire(lane) => permit,
    };

    let now = Instant::now();
    let decision = gate::check(&shared.license, &shared.meter, &policy, &node.atom_name, now, 0.0);

    match decision {
        GateDecision::Throttled => {
            drop(permit);
            if let Some(m) = &shared.metrics {
                m.inc_admission_throttled(lane_label);
            }
            let sig = shared.system_signal(
                SIG_ATOM_THROTTLED,
                Some(node.node_id.clone()),
                SignalValue::from(node.node_id.as_str()),
            );
            shared.emit(sig);
            return;
        }
        GateDecision::DegradedSkip => {
            drop(permit);
            if let Some(m) = &shared.metrics {
                m.inc_admission_denied(lane_label);
            }
            let sig = shared.system_signal(
                SIG_ATOM_DEGRADED,
                Some(node.node_id.clone()),
                SignalValue::from(node.node_id.as_str()),
            );
            shared.emit(sig);
            return;
        }
        GateDecision::LicenseRequired => {
            drop(permit);
            if let Some(m) = &shared.metrics {
                m.inc_admission_denied(lane_label);
            }
            let sig = shared.system_signal(
                SIG_LICENSE_REQUIRED,
                Some(node.node_id.clone()),
                SignalValue::from(node.node_id.as_str()),
            );
            shared.emit(sig);
            record_failure(shared, node);
            return;
        }
        GateDecision::Admitted(_cost, events) => {
            if let Some(m) = &shared.metrics {
                m.inc_admission_granted(lane_label);
                m.set_work_units_current(shared.meter.current_work_units(now));
            }
            for event in events {
                if let Some(m) = &shared.metrics {
                    m.inc_threshold_crossing();
                }
                let mut fields = BTreeMap::new();
                fields.insert("percentage".to_string(), SignalValue::Number(event.percentage as f64));
                fields.insert("current".to_string(), SignalValue::Number(event.current));
                fields.insert("max".to_string(), SignalValue::Number(event.max));
                let sig = shared.system_signal(SIG_WORKUNIT_THRESHOLD, None, SignalValue::Record(fields));
                shared.emit(sig);
            }
        }
    }

    if let Some(m) = &shared.metrics {
        m.inc_atom_invocation(&node.node_id);
    }

    let ctx = RunContext {
        run_id: shared.run_id.clone(),
        node_id: node.node_id.clone(),
        config: node.config.clone(),
        services: shared.services.clone(),
        sink: shared.sink.clone(),
    };

    let atom_timeout = shared.config.atom_timeout.as_duration();
    let coordinator_timeout = shared.config.coordinator_shutdown_timeout.as_duration();
    let effective_timeout = atom_timeout.min(coordinator_timeout);

    let outcome = run_atom_with_deadline(atom, ctx, inputs, effective_timeout, &shared.cancel).await;
    drop(permit);

    match outcome {
        AtomOutcome::Success(emitted) => {
            reset_failures(node);
            for sig in emitted {
                shared.emit(sig);
            }
        }
        AtomOutcome::Error(message) => {
            flow_warn!(atom, node = %node.node_id, error = %message, "atom invocation failed");
            if let Some(m) = &shared.metrics {
                m.inc_atom_error(&node.node_id);
            }
            let sig = shared.system_signal(
                SIG_ATOM_ERROR,
                Some(node.node_id.clone()),
                SignalValue::from(message.as_str()),
            );
            shared.emit(sig);
            record_failure(shared, node);
        }
        AtomOutcome::Timeout => {
            flow_warn!(atom, node = %node.node_id, "atom invocation timed out");
            if let Some(m) = &shared.metrics {
                m.inc_atom_error(&node.node_id);
            }
            let sig = shared.system_signal(
                SIG_ATOM_ERROR,
                Some(node.node_id.clone()),
                SignalValue::from("timeout"),
            );
            shared.emit(sig);
            record_failure(shared, node);
        }
        AtomOutcome::Cancelled => {
            flow_debug!(sched, node = %node.node_id, "atom invocation cancelled");
        }
    }
}

enum AtomOutcome {
    Success(Vec<Signal>),
    Error(String),
    Timeout,
    Cancelled,
}

/// Runs the atom as its own task so an uncooperative invocation can be
/// abandoned via `abort` rather than blocking shutdown forever: up to
/// `timeout` under normal operation, up to `2 * timeout` of grace once
/// cancellation has already been observed.
async fn run_atom_with_deadline(
    atom: Arc<dyn Atom>,
    ctx: RunContext,
    inputs: Vec<Signal>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> AtomOutcome {
    let mut handle = tokio::spawn(async move { atom.run(&ctx, &inputs).await });

    tokio::select! {
        result = tokio::time::timeout(timeout, &mut handle) => {
            match result {
                Ok(Ok(Ok(emitted))) => AtomOutcome::Success(emitted),
                Ok(Ok(Err(e))) => AtomOutcome::Error(e.to_string()),
                Ok(Err(_join_err)) => AtomOutcome::Error("atom task panicked".to_string()),
                Err(_elapsed) => {
                    handle.abort();
                    AtomOutcome::Timeout
                }
            }
        }
        _ = cancel.cancelled() => {
            let grace = timeout * 2;
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(Ok(emitted))) => AtomOutcome::Success(emitted),
                Ok(Ok(Err(e))) => AtomOutcome::Error(e.to_string()),
                Ok(Err(_join_err)) => AtomOutcome::Cancelled,
                Err(_elapsed) => {
                    handle.abort();
                    AtomOutcome::Cancelled
                }
            }
        }
    }
}

fn record_failure(shared: &Arc<SchedulerShared>, node: &Arc<NodeRuntime>) {
    let quarantine = {
        let mut failures = node.failures.lock();
        let now = Instant::now();
        failures.push_back(now);
        while let Some(front) = failures.front() {
            if now.saturating_duration_since(*front) > Duration::from_secs(60) {
                failures.pop_front();
            } else {
                break;
            }
        }
        failures.len() as u32 >= shared.config.quarantine_threshold
    };
    if quarantine && !node.quarantined.swap(true, AtomicOrdering::SeqCst) {
        flow_warn!(sched, node = %node.node_id, "node quarantined after repeated failures");
        if let Some(m) = &shared.metrics {
            m.inc_atom_quarantined(&node.node_id);
        }
        let sig = shared.system_signal(
            SIG_ATOM_QUARANTINED,
            Some(node.node_id.clone()),
            SignalValue::from(node.node_id.as_str()),
        );
        shared.emit(sig);
    }
}

fn reset_failures(node: &Arc<NodeRuntime>) {
    node.failures.lock().clear();
}
