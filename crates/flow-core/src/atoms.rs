//! Concrete atoms wrapping the windowed reducers/scorers in [`crate::reducers`]
//! so a workflow can actually invoke BM25 ranking, RRF fusion, MMR selection,
//! deduplication, top-K and numeric folds as ordinary nodes. Each atom reads
//! its window name and any tunables from `RunContext::config`; all are
//! deterministic, non-persistent, and run on the `fast` lane unless noted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::atom::{Atom, AtomContract, AtomKind, Lane, RunContext};
use crate::error::{CoreError, CoreReason, CoreResult};
use crate::gate::LicensePolicy;
use crate::reducers::{accumulate, bm25, dedup, fold, mmr, rrf, topk};
use crate::registry::AtomRegistry;
use crate::signal::{Signal, SignalValue};

fn window_name(ctx: &RunContext) -> CoreResult<&str> {
    ctx.config_str("window").ok_or_else(|| {
        CoreError::from(CoreReason::InvalidWorkflow(format!(
            "node {} is missing required config key \"window\"",
            ctx.node_id
        )))
    })
}

fn emit(ctx: &RunContext, name: &str, value: SignalValue) -> Signal {
    Signal::new(ctx.run_id.clone(), ctx.node_id.clone(), name, value, ctx.services.clock.now())
}

/// Pushes each triggering input's value into its configured window and
/// reports the new count. Grounds `accumulator.count` (spec §1 module F).
pub struct WindowCollectorAtom;

#[async_trait]
impl Atom for WindowCollectorAtom {
    async fn run(&self, ctx: &RunContext, inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let window = window_name(ctx)?;
        let now = ctx.services.clock.now();
        let mut count = 0usize;
        for input in inputs {
            count = accumulate::accumulate(&ctx.sink, window, input.key.clone(), input.value.clone(), now);
        }
        Ok(vec![emit(ctx, "accumulator.count", SignalValue::Number(count as f64))])
    }
}

/// Numeric fold (sum/avg/min/max/median/stddev) over a window's contents.
pub struct FoldAtom;

#[async_trait]
impl Atom for FoldAtom {
    async fn run(&self, ctx: &RunContext, _inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let window = window_name(ctx)?;
        let entries = ctx.sink.window_query(window);
        let result = fold::fold(&entries);

        let mut fields = BTreeMap::new();
        fields.insert("count".to_string(), SignalValue::Number(result.count as f64));
        fields.insert("sum".to_string(), SignalValue::Number(result.sum));
        fields.insert("avg".to_string(), SignalValue::Number(result.avg));
        fields.insert("min".to_string(), SignalValue::Number(result.min));
        fields.insert("max".to_string(), SignalValue::Number(result.max));
        fields.insert("median".to_string(), SignalValue::Number(result.median));
        fields.insert("stddev".to_string(), SignalValue::Number(result.stddev));

        Ok(vec![emit(ctx, "fold.result", SignalValue::Record(fields))])
    }
}

/// Ranks a window of documents against the triggering signal's text with
/// Okapi BM25.
pub struct Bm25SearchAtom;

#[async_trait]
impl Atom for Bm25SearchAtom {
    async fn run(&self, ctx: &RunContext, inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let window = window_name(ctx)?;
        let query = inputs
            .iter()
            .find_map(|s| s.value.as_str())
            .ok_or_else(|| CoreError::from(CoreReason::InvalidWorkflow(format!(
                "node {} received no text-valued query signal",
                ctx.node_id
            ))))?;

        let entries = ctx.sink.window_query(window);
        let documents: Vec<String> = entries
            .iter()
            .filter_map(|e| e.entity.as_str().map(str::to_string))
            .collect();

        let params = bm25::Bm25Params {
            k1: ctx.config_f64("k1").unwrap_or(bm25::Bm25Params::default().k1),
            b: ctx.config_f64("b").unwrap_or(bm25::Bm25Params::default().b),
        };
        let ranked = bm25::score(&documents, query, params);

        let sequence = ranked
            .into_iter()
            .map(|doc| {
                let mut fields = BTreeMap::new();
                fields.insert("index".to_string(), SignalValue::Number(doc.index as f64));
                fields.insert("score".to_string(), SignalValue::Number(doc.score));
                if let Some(text) = documents.get(doc.index) {
                    fields.insert("document".to_string(), SignalValue::Text(text.clone()));
                }
                SignalValue::Record(fields)
            })
            .collect();

        Ok(vec![emit(ctx, "bm25.ranked", SignalValue::Sequence(sequence))])
    }
}

/// Near-duplicate clustering over a window of text entries.
pub struct DedupAtom;

#[async_trait]
impl Atom for DedupAtom {
    async fn run(&self, ctx: &RunContext, _inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let window = window_name(ctx)?;
        let entries = ctx.sink.window_query(window);
        let items: Vec<String> = entries
            .iter()
            .filter_map(|e| e.entity.as_str().map(str::to_string))
            .collect();
        let result = dedup::dedup(&items);

        let clusters = result
            .clusters
            .into_iter()
            .map(|c| {
                let mut fields = BTreeMap::new();
                fields.insert("representative_index".to_string(), SignalValue::Number(c.representative_index as f64));
                fields.insert(
                    "member_indices".to_string(),
                    SignalValue::Sequence(c.member_indices.into_iter().map(|i| SignalValue::Number(i as f64)).collect()),
                );
                SignalValue::Record(fields)
            })
            .collect();

        let mut fields = BTreeMap::new();
        fields.insert("clusters".to_string(), SignalValue::Sequence(clusters));
        fields.insert("duplicates_removed".to_string(), SignalValue::Number(result.duplicates_removed as f64));

        Ok(vec![emit(ctx, "dedup.clusters", SignalValue::Record(fields))])
    }
}

/// Selects the `k` highest-scoring `{id, score}` entries from a window.
pub struct TopKAtom;

#[async_trait]
impl Atom for TopKAtom {
    async fn run(&self, ctx: &RunContext, _inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let window = window_name(ctx)?;
        let k = ctx.config_f64("k").unwrap_or(10.0) as usize;
        let entries = ctx.sink.window_query(window);

        let items: Vec<(String, f64)> = entries
            .iter()
            .filter_map(|e| {
                let record = e.entity.as_record()?;
                let id = record.get("id")?.as_str()?.to_string();
                let score = record.get("score")?.as_f64()?;
                Some((id, score))
            })
            .collect();

        let result = topk::select(&items, k);
        let selected = result
            .selected
            .into_iter()
            .map(|(id, score)| {
                let mut fields = BTreeMap::new();
                fields.insert("id".to_string(), SignalValue::Text(id));
                fields.insert("score".to_string(), SignalValue::Number(score));
                SignalValue::Record(fields)
            })
            .collect();

        let mut fields = BTreeMap::new();
        fields.insert("selected".to_string(), SignalValue::Sequence(selected));
        fields.insert("count".to_string(), SignalValue::Number(result.count as f64));
        fields.insert("dropped".to_string(), SignalValue::Number(result.dropped as f64));

        Ok(vec![emit(ctx, "topk.selected", SignalValue::Record(fields))])
    }
}

/// Reciprocal Rank Fusion over each triggering input's ranked id list.
pub struct RrfFuseAtom;

#[async_trait]
impl Atom for RrfFuseAtom {
    async fn run(&self, ctx: &RunContext, inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let lists: Vec<Vec<String>> = inputs
            .iter()
            .filter_map(|s| s.value.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .collect();

        let params = rrf::RrfParams {
            k: ctx.config_f64("k").unwrap_or(rrf::RrfParams::default().k),
        };
        let fused = rrf::fuse(&lists, params);

        let sequence = fused
            .into_iter()
            .map(|item| {
                let mut fields = BTreeMap::new();
                fields.insert("id".to_string(), SignalValue::Text(item.id));
                fields.insert("score".to_string(), SignalValue::Number(item.score));
                SignalValue::Record(fields)
            })
            .collect();

        Ok(vec![emit(ctx, "rrf.fused", SignalValue::Sequence(sequence))])
    }
}

/// Greedy MMR selection. Expects the triggering signal to carry a record
/// `{query: [f64...], candidates: [{id, embedding: [f64...]}...]}`.
pub struct MmrSelectAtom;

#[async_trait]
impl Atom for MmrSelectAtom {
    async fn run(&self, ctx: &RunContext, inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
        let record = inputs
            .iter()
            .find_map(|s| s.value.as_record())
            .ok_or_else(|| CoreError::from(CoreReason::InvalidWorkflow(format!(
                "node {} received no record-valued query/candidates signal",
                ctx.node_id
            ))))?;

        let query: Vec<f64> = record
            .get("query")
            .and_then(|v| v.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_f64()).collect())
            .unwrap_or_default();

        let candidates: Vec<(String, Vec<f64>)> = record
            .get("candidates")
            .and_then(|v| v.as_sequence())
            .map(|seq| {
                seq.iter()
                    .filter_map(|c| {
                        let rec = c.as_record()?;
                        let id = rec.get("id")?.as_str()?.to_string();
                        let embedding = rec.get("embedding")?.as_sequence()?.iter().filter_map(|v| v.as_f64()).collect();
                        Some((id, embedding))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let params = mmr::MmrParams {
            lambda: ctx.config_f64("lambda").unwrap_or(mmr::MmrParams::default().lambda),
            top_k: ctx.config_f64("top_k").unwrap_or(mmr::MmrParams::default().top_k as f64) as usize,
        };
        let selected = mmr::select(&query, &candidates, params);

        Ok(vec![emit(
            ctx,
            "mmr.selected",
            SignalValue::Sequence(selected.into_iter().map(SignalValue::Text).collect()),
        )])
    }
}

/// `reads: ["*"]` marks a sink/logger that the scheduler dispatches on
/// every signal; none of these atoms are loggers, so each gets its own
/// real trigger name instead.
fn contract(name: &str, kind: AtomKind, reads: &[&str], writes: &str, lane: Lane) -> AtomContract {
    AtomContract {
        name: name.to_string(),
        kind,
        deterministic: true,
        persistent: false,
        reads: reads.iter().map(|s| s.to_string()).collect(),
        writes: vec![writes.to_string()],
        license: LicensePolicy::default(),
        lane,
    }
}

/// Registers the built-in reducer/scorer atoms under their conventional
/// names (`reducer.accumulate`, `reducer.fold`, `scorer.bm25`, ...) so a
/// workflow's `atomName` can reference them directly.
pub fn register_builtin(registry: &mut AtomRegistry) -> Result<(), CoreError> {
    registry.register(
        contract("reducer.accumulate", AtomKind::Extractor, &["window.item"], "accumulator.count", Lane::Fast),
        Arc::new(WindowCollectorAtom),
    )?;
    registry.register(
        contract("reducer.fold", AtomKind::Analyzer, &["fold.trigger"], "fold.result", Lane::Fast),
        Arc::new(FoldAtom),
    )?;
    registry.register(
        contract("scorer.bm25", AtomKind::Analyzer, &["query.text"], "bm25.ranked", Lane::Fast),
        Arc::new(Bm25SearchAtom),
    )?;
    registry.register(
        contract("reducer.dedup", AtomKind::Analyzer, &["dedup.trigger"], "dedup.clusters", Lane::Fast),
        Arc::new(DedupAtom),
    )?;
    registry.register(
        contract("reducer.topk", AtomKind::Analyzer, &["topk.trigger"], "topk.selected", Lane::Fast),
        Arc::new(TopKAtom),
    )?;
    registry.register(
        contract("scorer.rrf", AtomKind::Analyzer, &["rrf.input"], "rrf.fused", Lane::Fast),
        Arc::new(RrfFuseAtom),
    )?;
    registry.register(
        contract("scorer.mmr", AtomKind::Analyzer, &["mmr.query"], "mmr.selected", Lane::Ml),
        Arc::new(MmrSelectAtom),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Services;
    use crate::ext::{NullStorage, SystemClock};
    use crate::sink::SignalSink;
    use flow_config::WindowConfig;
    use std::sync::Arc as StdArc;

    fn ctx(sink: StdArc<SignalSink>, config: serde_json::Value) -> RunContext {
        RunContext {
            run_id: "test-run".to_string(),
            node_id: "node".to_string(),
            config,
            services: StdArc::new(Services {
                clock: StdArc::new(SystemClock),
                storage: Some(StdArc::new(NullStorage)),
                llm: None,
            }),
            sink,
        }
    }

    #[tokio::test]
    async fn bm25_search_ranks_matching_document_first() {
        let sink = StdArc::new(SignalSink::new(100, std::time::Duration::from_secs(600), &WindowConfig::default()));
        let now = Utc::now();
        sink.window_add("docs", None, SignalValue::from("the quick brown fox"), now);
        sink.window_add("docs", None, SignalValue::from("completely unrelated text"), now);

        let atom = Bm25SearchAtom;
        let c = ctx(sink, serde_json::json!({"window": "docs"}));
        let query = Signal::new("test-run", "test", "query", SignalValue::from("quick fox"), now);
        let emitted = atom.run(&c, &[query]).await.unwrap();

        assert_eq!(emitted.len(), 1);
        let ranked = emitted[0].value.as_sequence().unwrap();
        let first = ranked[0].as_record().unwrap();
        assert_eq!(first.get("index").unwrap().as_f64().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn fold_over_empty_window_is_zeroed() {
        let sink = StdArc::new(SignalSink::new(100, std::time::Duration::from_secs(600), &WindowConfig::default()));
        let atom = FoldAtom;
        let c = ctx(sink, serde_json::json!({"window": "metrics"}));
        let emitted = atom.run(&c, &[]).await.unwrap();
        let fields = emitted[0].value.as_record().unwrap();
        assert_eq!(fields.get("count").unwrap().as_f64().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn missing_window_config_is_invalid_workflow() {
        let sink = StdArc::new(SignalSink::new(100, std::time::Duration::from_secs(600), &WindowConfig::default()));
        let atom = FoldAtom;
        let c = ctx(sink, serde_json::json!({}));
        let err = atom.run(&c, &[]).await.unwrap_err();
        assert!(err.to_string().contains("window"));
    }
}
