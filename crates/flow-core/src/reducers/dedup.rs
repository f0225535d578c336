use std::collections::HashMap;

const THRESHOLD: f64 = 0.9;
const W_JARO_WINKLER: f64 = 0.5;
const W_LEVENSHTEIN: f64 = 0.3;
const W_COSINE_BIGRAM: f64 = 0.2;

fn bigrams(s: &str) -> HashMap<String, usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut counts = HashMap::new();
    if chars.len() < 2 {
        if !chars.is_empty() {
            *counts.entry(chars[0].to_string()).or_insert(0) += 1;
        }
        return counts;
    }
    for pair in chars.windows(2) {
        let bigram: String = pair.iter().collect();
        *counts.entry(bigram).or_insert(0) += 1;
    }
    counts
}

fn cosine_bigram(a: &str, b: &str) -> f64 {
    let ba = bigrams(a);
    let bb = bigrams(b);
    let dot: f64 = ba
        .iter()
        .map(|(k, v)| *v as f64 * *bb.get(k).unwrap_or(&0) as f64)
        .sum();
    let norm_a = (ba.values().map(|v| (*v * *v) as f64).sum::<f64>()).sqrt();
    let norm_b = (bb.values().map(|v| (*v * *v) as f64).sum::<f64>()).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn combined_similarity(a: &str, b: &str) -> f64 {
    W_JARO_WINKLER * strsim::jaro_winkler(a, b)
        + W_LEVENSHTEIN * strsim::normalized_levenshtein(a, b)
        + W_COSINE_BIGRAM * cosine_bigram(a, b)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupCluster {
    pub representative_index: usize,
    pub member_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupResult {
    pub clusters: Vec<DedupCluster>,
    pub duplicates_removed: usize,
}

/// Clusters `items` by combined string similarity at the fixed threshold
/// `0.9`. Each cluster's representative is its smallest original index.
pub fn dedup(items: &[String]) -> DedupResult {
    let n = items.len();
    let mut uf = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if combined_similarity(&items[i], &items[j]) >= THRESHOLD {
                uf.union(i, j);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut clusters: Vec<DedupCluster> = groups
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            DedupCluster {
                representative_index: members[0],
                member_indices: members,
            }
        })
        .collect();
    clusters.sort_by_key(|c| c.representative_index);

    let duplicates_removed = n.saturating_sub(clusters.len());

    DedupResult { clusters, duplicates_removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_duplicate_strings_cluster_together() {
        let items = vec![
            "The quick brown fox".to_string(),
            "The quick brown fox.".to_string(),
            "Completely different sentence".to_string(),
        ];
        let result = dedup(&items);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.duplicates_removed, 1);
        let first_cluster = result.clusters.iter().find(|c| c.representative_index == 0).unwrap();
        assert_eq!(first_cluster.member_indices, vec![0, 1]);
    }

    #[test]
    fn distinct_strings_stay_separate() {
        let items = vec!["alpha".to_string(), "zulu".to_string()];
        let result = dedup(&items);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.duplicates_removed, 0);
    }
}
