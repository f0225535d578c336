#[derive(Debug, Clone, Copy)]
pub struct MmrParams {
    pub lambda: f64,
    pub top_k: usize,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self { lambda: 0.7, top_k: 10 }
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Greedy Maximal Marginal Relevance selection over `candidates`, scored
/// against `query` by cosine similarity on the given embeddings. Stops once
/// `top_k` items are chosen or candidates are exhausted.
pub fn select(
    query: &[f64],
    candidates: &[(String, Vec<f64>)],
    params: MmrParams,
) -> Vec<String> {
    let mut remaining: Vec<&(String, Vec<f64>)> = candidates.iter().collect();
    let mut selected: Vec<&(String, Vec<f64>)> = Vec::new();

    while !remaining.is_empty() && selected.len() < params.top_k {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, (_, embedding)) in remaining.iter().enumerate() {
            let relevance = cosine(query, embedding);
            let redundancy = selected
                .iter()
                .map(|(_, sel_embedding)| cosine(embedding, sel_embedding))
                .fold(0.0_f64, f64::max);
            let mmr_score = params.lambda * relevance - (1.0 - params.lambda) * redundancy;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected.into_iter().map(|(id, _)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_most_relevant_first() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            ("close".to_string(), vec![0.9, 0.1]),
            ("far".to_string(), vec![0.0, 1.0]),
        ];
        let selected = select(&query, &candidates, MmrParams { lambda: 1.0, top_k: 1 });
        assert_eq!(selected, vec!["close".to_string()]);
    }

    #[test]
    fn penalizes_redundant_second_pick() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("a_dup".to_string(), vec![1.0, 0.0]),
            ("diverse".to_string(), vec![0.0, 1.0]),
        ];
        let selected = select(&query, &candidates, MmrParams { lambda: 0.5, top_k: 2 });
        assert_eq!(selected[0], "a");
        assert_eq!(selected[1], "diverse");
    }
}
