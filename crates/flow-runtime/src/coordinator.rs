use std::sync::Arc;
use std::time::Duration;

use flow_config::FlowConfig;
use flow_core::atom::Services;
use flow_core::ext::Signer;
use flow_core::license::{LicenseManager, LicenseState, Tier};
use flow_core::meter::WorkUnitMeter;
use flow_core::registry::AtomRegistry;
use flow_core::signal::{Signal, SignalValue};
use flow_core::sink::SignalSink;
use flow_core::workflow::WorkflowDefinition;
use orion_error::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{RuntimeError, RuntimeReason, RuntimeResult};
use crate::metrics::{self, RuntimeMetrics};
use crate::scheduler::Scheduler;

pub const SIG_SYSTEM_READY: &str = "system.ready";
pub const SIG_SYSTEM_HEARTBEAT: &str = "system.heartbeat";
pub const SIG_SYSTEM_LICENSE_TIER: &str = "system.license.tier";
pub const SIG_LICENSE_STATE: &str = "license.state";

/// Everything a caller needs after startup to drive a run: the shared sink
/// (for inspection/testing) and the handle used to request shutdown.
pub struct Coordinator {
    cancel: CancellationToken,
    scheduler_task: JoinHandle<RuntimeResult<()>>,
    heartbeat_task: JoinHandle<()>,
    metrics_task: Option<JoinHandle<anyhow::Result<()>>>,
    shutdown_timeout: Duration,
    sink: Arc<SignalSink>,
}

impl Coordinator {
    /// Bootstraps the full runtime: signal sink, license manager, work-unit
    /// meter, the workflow scheduler, and the heartbeat/metrics side tasks.
    /// Parses and compiles the workflow first, then spawns task groups in
    /// start order.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        run_id: impl Into<String>,
        workflow_json: &str,
        license_token_json: Option<&str>,
        registry: Arc<AtomRegistry>,
        services: Arc<Services>,
        signer: Arc<dyn Signer>,
        config: FlowConfig,
    ) -> RuntimeResult<Self> {
        let run_id = run_id.into();
        let now = services.clock.now();

        let definition = WorkflowDefinition::parse(workflow_json)
            .map_err(|e| RuntimeError::from(RuntimeReason::Bootstrap(format!("invalid workflow json: {e}"))))?;
        if definition.nodes.len() > config.license.free_tier_max_nodes && license_token_json.is_none() {
            flow_warn!(sys, nodes = definition.nodes.len(), "workflow exceeds free-tier node limit");
        }
        let compiled = definition.compile(&registry).err_conv()?;

        let sink = Arc::new(SignalSink::new(
            config.window.max_items,
            config.window.max_age.as_duration(),
            &config.window,
        ));

        let license = Arc::new(LicenseManager::new(&config.license, signer).err_conv()?);
        if let Some(token_json) = license_token_json {
            let state = license.load_token(token_json, now);
            flow_info!(lic, state = ?state, "license token loaded");
        }

        let meter = Arc::new(WorkUnitMeter::new(&config.meter, license.max_work_units_per_minute()));

        let node_ids: Vec<String> = compiled.definition.nodes.iter().map(|n| n.id.clone()).collect();
        let metrics = metrics::maybe_build_metrics(&config.metrics, &node_ids);

        let cancel = CancellationToken::new();

        let scheduler = Scheduler::new(
            run_id.clone(),
            compiled,
            registry,
            sink.clone(),
            license.clone(),
            meter.clone(),
            services.clone(),
            config.scheduler.clone(),
            metrics.clone(),
            cancel.child_token(),
        )?;
        let scheduler_task = tokio::spawn(scheduler.run());

        let metrics_task = metrics.clone().map(|m| {
            tokio::spawn(metrics::run_metrics_task(m, config.metrics.clone(), cancel.child_token()))
        });

        let tier = license.current_tier();
        emit_system(&sink, &services, &run_id, SIG_SYSTEM_READY, SignalValue::from("ready"));
        emit_system(&sink, &services, &run_id, SIG_SYSTEM_LICENSE_TIER, SignalValue::from(tier_label(tier)));
        flow_info!(sys, tier = ?tier, "system ready");

        let heartbeat_task = spawn_heartbeat(
            sink.clone(),
            services.clone(),
            license.clone(),
            meter.clone(),
            run_id.clone(),
            config.scheduler.heartbeat_interval.as_duration(),
            cancel.child_token(),
        );

        Ok(Self {
            cancel,
            scheduler_task,
            heartbeat_task,
            metrics_task,
            shutdown_timeout: config.scheduler.coordinator_shutdown_timeout.as_duration(),
            sink,
        })
    }

    pub fn sink(&self) -> &Arc<SignalSink> {
        &self.sink
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown: cancel every child task, then drain the
    /// in-flight scheduler work bounded by `coordinator_shutdown_timeout`.
    pub fn shutdown(&self) {
        flow_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    /// Waits for the scheduler and side tasks to finish: heartbeat/metrics
    /// first (they have no in-flight state to drain), then the scheduler, bounded by the
    /// configured shutdown timeout.
    pub async fn wait(self) -> RuntimeResult<()> {
        let _ = self.heartbeat_task.await;
        if let Some(metrics_task) = self.metrics_task {
            let _ = metrics_task.await;
        }

        match tokio::time::timeout(self.shutdown_timeout, self.scheduler_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RuntimeError::from(RuntimeReason::Shutdown(format!(
                "scheduler task panicked: {join_err}"
            )))),
            Err(_elapsed) => Err(RuntimeError::from(RuntimeReason::Shutdown(
                "scheduler did not drain within shutdown timeout".to_string(),
            ))),
        }
    }
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "free",
        Tier::Starter => "starter",
        Tier::Professional => "professional",
        Tier::Enterprise => "enterprise",
    }
}

fn emit_system(sink: &Arc<SignalSink>, services: &Arc<Services>, run_id: &str, name: &str, value: SignalValue) {
    let now = services.clock.now();
    sink.emit(Signal::new(run_id.to_string(), "coordinator", name, value, now), now);
}

#[allow(clippy::too_many_arguments)]
fn spawn_heartbeat(
    sink: Arc<SignalSink>,
    services: Arc<Services>,
    license: Arc<LicenseManager>,
    meter: Arc<WorkUnitMeter>,
    run_id: String,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        let mut last_state = license.current_state();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let now = services.clock.now();
                    let state = license.revalidate(now);
                    meter.set_max_work_units(license.max_work_units_per_minute());

                    emit_system(&sink, &services, &run_id, SIG_SYSTEM_HEARTBEAT, SignalValue::from("beat"));

                    if state != last_state {
                        flow_info!(lic, from = ?last_state, to = ?state, "license state transition");
                        emit_system(&sink, &services, &run_id, SIG_LICENSE_STATE, SignalValue::from(state_label(state)));
                        last_state = state;
                    }
                }
            }
        }
        flow_debug!(sys, "heartbeat task stopped");
    })
}

fn state_label(state: LicenseState) -> &'static str {
    match state {
        LicenseState::Unlicensed => "unlicensed",
        LicenseState::Valid => "valid",
        LicenseState::ExpiringSoon => "expiring_soon",
        LicenseState::Expired => "expired",
        LicenseState::InGrace => "in_grace",
        LicenseState::Revoked => "revoked",
        LicenseState::FreeTier => "free_tier",
        LicenseState::Invalid => "invalid",
    }
}

/// Waits for SIGINT/SIGTERM then cancels the coordinator.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                flow_info!(sys, signal = "SIGINT", "received signal, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                flow_info!(sys, signal = "SIGTERM", "received signal, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to listen for Ctrl-C");
        flow_info!(sys, "received shutdown signal, initiating graceful shutdown");
    }
    cancel.cancel();
}
