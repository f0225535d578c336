use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use flow_config::MetricsConfig;

const LANES: [&str; 4] = ["fast", "io", "ml", "llm"];

/// Shared runtime metrics store.
///
/// Counters are lock-free atomics. Label sets (`lane`, node id) are fixed at
/// startup from the compiled workflow, keeping hot-path updates
/// allocation-free.
pub struct RuntimeMetrics {
    signals_emitted_total: AtomicU64,
    sink_subscriber_drops_total: AtomicU64,

    admissions_granted_total: BTreeMap<&'static str, AtomicU64>,
    admissions_throttled_total: BTreeMap<&'static str, AtomicU64>,
    admissions_denied_total: BTreeMap<&'static str, AtomicU64>,

    atom_invocations_total: BTreeMap<String, AtomicU64>,
    atom_errors_total: BTreeMap<String, AtomicU64>,
    atom_quarantine_events_total: BTreeMap<String, AtomicU64>,

    work_units_current: AtomicU64,
    threshold_crossings_total: AtomicU64,
}

impl RuntimeMetrics {
    pub fn new(node_ids: &[String]) -> Self {
        let make_lane_map = || LANES.iter().map(|l| (*l, AtomicU64::new(0))).collect();
        let make_node_map = || {
            node_ids
                .iter()
                .map(|id| (id.clone(), AtomicU64::new(0)))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            signals_emitted_total: AtomicU64::new(0),
            sink_subscriber_drops_total: AtomicU64::new(0),
            admissions_granted_total: make_lane_map(),
            admissions_throttled_total: make_lane_map(),
            admissions_denied_total: make_lane_map(),
            atom_invocations_total: make_node_map(),
            atom_errors_total: make_node_map(),
            atom_quarantine_events_total: make_node_map(),
            work_units_current: AtomicU64::new(0),
            threshold_crossings_total: AtomicU64::new(0),
        }
    }

    pub fn inc_signal_emitted(&self) {
        self.signals_emitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sink_subscriber_drop(&self) {
        self.sink_subscriber_drops_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admission_granted(&self, lane: &str) {
        if let Some(v) = self.admissions_granted_total.get(lane) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_admission_throttled(&self, lane: &str) {
        if let Some(v) = self.admissions_throttled_total.get(lane) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_admission_denied(&self, lane: &str) {
        if let Some(v) = self.admissions_denied_total.get(lane) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_atom_invocation(&self, node_id: &str) {
        if let Some(v) = self.atom_invocations_total.get(node_id) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_atom_error(&self, node_id: &str) {
        if let Some(v) = self.atom_errors_total.get(node_id) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_atom_quarantined(&self, node_id: &str) {
        if let Some(v) = self.atom_quarantine_events_total.get(node_id) {
            v.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_work_units_current(&self, value: f64) {
        self.work_units_current
            .store(value.max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn inc_threshold_crossing(&self) {
        self.threshold_crossings_total
            .fetch_add(1, Ordering::Relaxed);
    }

    fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(4 * 1024);

        self.render_counter(
            &mut out,
            "flow_signals_emitted_total",
            self.signals_emitted_total.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            "flow_sink_subscriber_drops_total",
            self.sink_subscriber_drops_total.load(Ordering::Relaxed),
        );

        for (lane, value) in &self.admissions_granted_total {
            self.render_counter_labeled(
                &mut out,
                "flow_admissions_granted_total",
                &[("lane", lane)],
                value.load(Ordering::Relaxed),
            );
        }
        for (lane, value) in &self.admissions_throttled_total {
            self.render_counter_labeled(
                &mut out,
                "flow_admissions_throttled_total",
                &[("lane", lane)],
                value.load(Ordering::Relaxed),
            );
        }
        for (lane, value) in &self.admissions_denied_total {
            self.render_counter_labeled(
                &mut out,
                "flow_admissions_denied_total",
                &[("lane", lane)],
                value.load(Ordering::Relaxed),
            );
        }

        for (node, value) in &self.atom_invocations_total {
            self.render_counter_labeled(
                &mut out,
                "flow_atom_invocations_total",
                &[("node", node)],
                value.load(Ordering::Relaxed),
            );
        }
        for (node, value) in &self.atom_errors_total {
            self.render_counter_labeled(
                &mut out,
                "flow_atom_errors_total",
                &[("node", node)],
                value.load(Ordering::Relaxed),
            );
        }
        for (node, value) in &self.atom_quarantine_events_total {
            self.render_counter_labeled(
                &mut out,
                "flow_atom_quarantine_events_total",
                &[("node", node)],
                value.load(Ordering::Relaxed),
            );
        }

        self.render_gauge(
            &mut out,
            "flow_work_units_current",
            self.work_units_current.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            "flow_threshold_crossings_total",
            self.threshold_crossings_total.load(Ordering::Relaxed),
        );

        out
    }

    fn render_counter(&self, out: &mut String, name: &str, value: u64) {
        let _ = writeln!(out, "# TYPE {name} counter");
        let _ = writeln!(out, "{name} {value}");
    }

    fn render_gauge(&self, out: &mut String, name: &str, value: u64) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        let _ = writeln!(out, "{name} {value}");
    }

    fn render_counter_labeled(&self, out: &mut String, name: &str, labels: &[(&str, &str)], value: u64) {
        let _ = writeln!(out, "# TYPE {name} counter");
        let _ = writeln!(out, "{name}{} {value}", format_labels(labels));
    }

    pub fn summary_line(&self) -> String {
        format!(
            "signals={} granted={} throttled={} denied={} errors={} quarantines={} work_units={}",
            self.signals_emitted_total.load(Ordering::Relaxed),
            self.admissions_granted_total.values().map(|v| v.load(Ordering::Relaxed)).sum::<u64>(),
            self.admissions_throttled_total.values().map(|v| v.load(Ordering::Relaxed)).sum::<u64>(),
            self.admissions_denied_total.values().map(|v| v.load(Ordering::Relaxed)).sum::<u64>(),
            self.atom_errors_total.values().map(|v| v.load(Ordering::Relaxed)).sum::<u64>(),
            self.atom_quarantine_events_total.values().map(|v| v.load(Ordering::Relaxed)).sum::<u64>(),
            self.work_units_current.load(Ordering::Relaxed),
        )
    }
}

fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut out = String::from("{");
    for (idx, (key, value)) in labels.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push('=');
        out.push('"');
        for ch in value.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                _ => out.push(ch),
            }
        }
        out.push('"');
    }
    out.push('}');
    out
}

pub async fn run_metrics_task(
    metrics: Arc<RuntimeMetrics>,
    config: MetricsConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    flow_info!(
        met,
        listen = %config.listen_addr,
        interval = %config.report_interval,
        "metrics exporter started"
    );

    let mut tick = tokio::time::interval(config.report_interval.as_duration());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                flow_info!(met, summary = %metrics.summary_line(), "metrics snapshot");
            }
            result = listener.accept() => {
                let (mut stream, _) = result?;
                let body = metrics.render_prometheus();
                let mut req_buf = [0u8; 512];
                let req_n = stream.read(&mut req_buf).await.unwrap_or(0);
                let is_metrics = req_n > 0
                    && std::str::from_utf8(&req_buf[..req_n]).unwrap_or("").starts_with("GET /metrics");
                if is_metrics {
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(header.as_bytes()).await?;
                    stream.write_all(body.as_bytes()).await?;
                } else {
                    stream
                        .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await?;
                }
                stream.shutdown().await?;
            }
        }
    }
    Ok(())
}

pub fn maybe_build_metrics(config: &MetricsConfig, node_ids: &[String]) -> Option<Arc<RuntimeMetrics>> {
    if !config.enabled {
        return None;
    }
    Some(Arc::new(RuntimeMetrics::new(node_ids)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let m = RuntimeMetrics::new(&["n1".to_string()]);
        m.inc_signal_emitted();
        m.inc_admission_granted("fast");
        m.inc_atom_invocation("n1");
        let rendered = m.render_prometheus();
        assert!(rendered.contains("flow_signals_emitted_total 1"));
        assert!(rendered.contains("lane=\"fast\""));
        assert!(rendered.contains("node=\"n1\""));
    }

    #[test]
    fn unknown_node_is_ignored() {
        let m = RuntimeMetrics::new(&["n1".to_string()]);
        m.inc_atom_invocation("missing");
        assert!(m.summary_line().contains("signals=0"));
    }
}
