use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct RrfParams {
    pub k: f64,
}

impl Default for RrfParams {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedItem {
    pub id: String,
    pub score: f64,
}

/// Reciprocal Rank Fusion over `lists` (each a ranked sequence of item ids,
/// rank 1 = first element). A duplicate id within one list only contributes
/// its first (best) rank to that list's term.
pub fn fuse(lists: &[Vec<String>], params: RrfParams) -> Vec<FusedItem> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for list in lists {
        let mut seen_in_list = std::collections::HashSet::new();
        for (idx, id) in list.iter().enumerate() {
            if !seen_in_list.insert(id.clone()) {
                continue;
            }
            let rank = (idx + 1) as f64;
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (params.k + rank);
        }
    }

    let mut fused: Vec<FusedItem> = scores
        .into_iter()
        .map(|(id, score)| FusedItem { id, score })
        .collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ranked_first_in_both_lists_wins() {
        let lists = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["a".to_string(), "c".to_string(), "b".to_string()],
        ];
        let fused = fuse(&lists, RrfParams::default());
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn duplicate_within_a_list_counts_once() {
        let lists = vec![vec!["a".to_string(), "a".to_string(), "b".to_string()]];
        let fused = fuse(&lists, RrfParams::default());
        let a = fused.iter().find(|f| f.id == "a").unwrap();
        let expected = 1.0 / (60.0 + 1.0);
        assert!((a.score - expected).abs() < 1e-12);
    }
}
