#[derive(Debug, Clone, PartialEq)]
pub struct TopKResult {
    pub selected: Vec<(String, f64)>,
    pub count: usize,
    pub dropped: usize,
}

/// Partial sort selecting the `k` highest-scoring items, stable on ties
/// (earlier insertion wins).
pub fn select(items: &[(String, f64)], k: usize) -> TopKResult {
    let mut indexed: Vec<(usize, &(String, f64))> = items.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.1.partial_cmp(&a.1).unwrap().then(ia.cmp(ib)));

    let selected: Vec<(String, f64)> = indexed
        .into_iter()
        .take(k)
        .map(|(_, item)| item.clone())
        .collect();
    let count = selected.len();
    let dropped = items.len().saturating_sub(count);

    TopKResult { selected, count, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_highest_scores_descending() {
        let items = vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 3.0),
            ("c".to_string(), 2.0),
        ];
        let result = select(&items, 2);
        assert_eq!(result.selected, vec![("b".to_string(), 3.0), ("c".to_string(), 2.0)]);
        assert_eq!(result.count, 2);
        assert_eq!(result.dropped, 1);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let items = vec![
            ("first".to_string(), 1.0),
            ("second".to_string(), 1.0),
        ];
        let result = select(&items, 2);
        assert_eq!(result.selected[0].0, "first");
        assert_eq!(result.selected[1].0, "second");
    }

    #[test]
    fn k_larger_than_input_drops_nothing() {
        let items = vec![("a".to_string(), 1.0)];
        let result = select(&items, 5);
        assert_eq!(result.count, 1);
        assert_eq!(result.dropped, 0);
    }
}
