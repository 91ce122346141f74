use crate::types::{AccountStatus, Change, TotalsDiff, TransactionTotals};

/// Compute the metrics whose totals differ between two snapshots.
///
/// Returns exactly the metrics where `previous[k] != current[k]`, each
/// mapped to `(previous[k], current[k])`. Comparison is exact.
pub fn diff_totals(previous: &TransactionTotals, current: &TransactionTotals) -> TotalsDiff {
    current
        .iter()
        .filter_map(|(metric, new)| {
            let old = previous.get(metric);
            (old != new).then(|| (metric.to_string(), Change::new(old, new)))
        })
        .collect()
}

/// `Some` when the balance moved.
pub fn balance_change(previous: i64, current: i64) -> Option<Change> {
    (previous != current).then(|| Change::new(previous, current))
}

/// True for the first observation and for any field-level difference.
pub fn status_changed(previous: Option<&AccountStatus>, current: &AccountStatus) -> bool {
    previous != Some(current)
}

/// Sum of all deltas in a diff, saturating at the `i64` bounds.
pub fn net_delta(diff: &TotalsDiff) -> i64 {
    diff.values()
        .fold(0i64, |acc, change| acc.saturating_add(change.delta()))
}
