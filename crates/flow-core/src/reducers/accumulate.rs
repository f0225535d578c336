use chrono::{DateTime, Utc};

use crate::signal::SignalValue;
use crate::sink::SignalSink;

/// Pushes `entity` into the named window and returns the window's new
/// count, the value an accumulator atom emits as `accumulator.count`.
pub fn accumulate(
    sink: &SignalSink,
    window_name: &str,
    key: Option<String>,
    entity: SignalValue,
    now: DateTime<Utc>,
) -> usize {
    sink.window_add(window_name, key, entity, now);
    sink.window_query(window_name).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_config::WindowConfig;

    #[test]
    fn accumulate_grows_window_count() {
        let sink = SignalSink::new(100, std::time::Duration::from_secs(600), &WindowConfig::default());
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(accumulate(&sink, "docs", None, SignalValue::from("a"), now), 1);
        assert_eq!(accumulate(&sink, "docs", None, SignalValue::from("b"), now), 2);
    }
}
