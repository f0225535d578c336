//! Ranked aggregation primitives that read from named sink windows and
//! compute the values an atom wraps into emitted signals (`accumulator.count`,
//! `topk.count`, `dedup.clusters`, ...). These are pure functions over
//! snapshots; the corresponding atoms own calling `SignalSink::window_query`
//! and emitting the result.

pub mod accumulate;
pub mod bm25;
pub mod dedup;
pub mod fold;
pub mod mmr;
pub mod rrf;
pub mod tfidf;
pub mod topk;

pub mod tokenize {
    use unicode_segmentation::UnicodeSegmentation;

    /// Lowercase, Unicode word-boundary tokenization dropping tokens of
    /// length ≤ 1.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| w.chars().count() > 1)
            .collect()
    }
}
