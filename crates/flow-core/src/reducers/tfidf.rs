use std::collections::HashMap;

use super::tokenize::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfVariant {
    Raw,
    Boolean,
    Log,
    DoubleNormalized,
    Augmented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdfVariant {
    Standard,
    Smooth,
    Probabilistic,
}

#[derive(Debug, Clone, Copy)]
pub struct TfIdfParams {
    pub tf: TfVariant,
    pub idf: IdfVariant,
}

impl Default for TfIdfParams {
    fn default() -> Self {
        Self {
            tf: TfVariant::Log,
            idf: IdfVariant::Smooth,
        }
    }
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    counts
}

fn tf_weight(variant: TfVariant, raw_count: usize, max_count: usize) -> f64 {
    let raw = raw_count as f64;
    match variant {
        TfVariant::Raw => raw,
        TfVariant::Boolean => {
            if raw > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        TfVariant::Log => {
            if raw > 0.0 {
                1.0 + raw.ln()
            } else {
                0.0
            }
        }
        TfVariant::DoubleNormalized => {
            if max_count == 0 {
                0.0
            } else {
                0.5 + 0.5 * raw / max_count as f64
            }
        }
        TfVariant::Augmented => {
            const K: f64 = 0.4;
            if max_count == 0 {
                0.0
            } else {
                K + (1.0 - K) * raw / max_count as f64
            }
        }
    }
}

fn idf_weight(variant: IdfVariant, n: f64, df: f64) -> f64 {
    match variant {
        IdfVariant::Standard => (n / df).ln(),
        IdfVariant::Smooth => (1.0 + n / df).ln(),
        IdfVariant::Probabilistic => ((n - df) / df).max(0.0).ln().max(0.0),
    }
}

/// Per-document term → weight map under the chosen TF/IDF variant pair.
pub fn tf_idf_matrix(documents: &[String], params: TfIdfParams) -> Vec<HashMap<String, f64>> {
    let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let n = doc_tokens.len() as f64;

    let mut df: HashMap<&str, f64> = HashMap::new();
    for doc in &doc_tokens {
        let unique: std::collections::HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0.0) += 1.0;
        }
    }

    doc_tokens
        .iter()
        .map(|doc| {
            let counts = term_frequencies(doc);
            let max_count = counts.values().copied().max().unwrap_or(0);
            counts
                .into_iter()
                .map(|(term, count)| {
                    let tf = tf_weight(params.tf, count, max_count);
                    let idf = idf_weight(params.idf, n, *df.get(term).unwrap_or(&1.0));
                    (term.to_string(), tf * idf)
                })
                .collect()
        })
        .collect()
}

/// Top `n` distinctive terms for one document's row, descending by weight.
pub fn top_terms(matrix: &[HashMap<String, f64>], doc_index: usize, n: usize) -> Vec<(String, f64)> {
    let Some(row) = matrix.get(doc_index) else {
        return Vec::new();
    };
    let mut terms: Vec<(String, f64)> = row.iter().map(|(t, w)| (t.clone(), *w)).collect();
    terms.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    terms.truncate(n);
    terms
}
