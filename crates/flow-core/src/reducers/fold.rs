use crate::signal::WindowEntry;

/// Numeric fold over `entity` values read as `f64` (non-numeric entries are
/// skipped). An empty window yields all-zero fields with `count = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldResult {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub stddev: f64,
}

pub fn fold(entries: &[WindowEntry]) -> FoldResult {
    let mut values: Vec<f64> = entries.iter().filter_map(|e| e.entity.as_f64()).collect();
    if values.is_empty() {
        return FoldResult {
            count: 0,
            sum: 0.0,
            avg: 0.0,
            min: 0.0,
            max: 0.0,
            median: 0.0,
            stddev: 0.0,
        };
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let avg = sum / count as f64;
    let min = values[0];
    let max = values[count - 1];
    let median = if count % 2 == 1 {
        values[count / 2]
    } else {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    };
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

    FoldResult {
        count,
        sum,
        avg,
        min,
        max,
        median,
        stddev: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalValue;
    use chrono::DateTime;

    fn entry(v: f64) -> WindowEntry {
        WindowEntry {
            key: None,
            entity: SignalValue::Number(v),
            fingerprint: 0,
            collected_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            processed: false,
        }
    }

    #[test]
    fn empty_window_is_all_zero() {
        let result = fold(&[]);
        assert_eq!(result.count, 0);
        assert_eq!(result.sum, 0.0);
    }

    #[test]
    fn fold_computes_expected_stats() {
        let entries: Vec<_> = [1.0, 2.0, 3.0, 4.0].into_iter().map(entry).collect();
        let result = fold(&entries);
        assert_eq!(result.count, 4);
        assert_eq!(result.sum, 10.0);
        assert_eq!(result.avg, 2.5);
        assert_eq!(result.min, 1.0);
        assert_eq!(result.max, 4.0);
        assert_eq!(result.median, 2.5);
        assert!((result.stddev - 1.1180339887).abs() < 1e-9);
    }

    #[test]
    fn odd_count_median_is_middle_value() {
        let entries: Vec<_> = [5.0, 1.0, 3.0].into_iter().map(entry).collect();
        let result = fold(&entries);
        assert_eq!(result.median, 3.0);
    }
}
