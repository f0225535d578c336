use std::collections::HashMap;

use super::tokenize::tokenize;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub index: usize,
    pub score: f64,
}

/// Scores `query` against `documents` with Okapi BM25. Ties are broken by
/// insertion order (stable sort on descending score).
pub fn score(documents: &[String], query: &str, params: Bm25Params) -> Vec<ScoredDoc> {
    let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let query_tokens = tokenize(query);

    let n = doc_tokens.len();
    if n == 0 || query_tokens.is_empty() {
        return Vec::new();
    }

    let avgdl = doc_tokens.iter().map(|d| d.len()).sum::<usize>() as f64 / n as f64;

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &doc_tokens {
        let unique: std::collections::HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    let idf = |term: &str| -> f64 {
        let df_t = *df.get(term).unwrap_or(&0) as f64;
        ((n as f64 - df_t + 0.5) / (df_t + 0.5) + 1.0).ln()
    };

    let mut scored: Vec<ScoredDoc> = doc_tokens
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            let dl = doc.len() as f64;
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for term in doc {
                *tf.entry(term.as_str()).or_insert(0) += 1;
            }
            let s = query_tokens
                .iter()
                .map(|term| {
                    let tf_t = *tf.get(term.as_str()).unwrap_or(&0) as f64;
                    if tf_t == 0.0 {
                        return 0.0;
                    }
                    idf(term) * (tf_t * (params.k1 + 1.0))
                        / (tf_t + params.k1 * (1.0 - params.b + params.b * dl / avgdl))
                })
                .sum();
            ScoredDoc { index, score: s }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then(a.index.cmp(&b.index)));
    scored
}
