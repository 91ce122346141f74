use std::io::Write;

use crate::types::MonitorEvent;

/// Emit a monitor event as a single JSON line to stdout.
pub fn report_event(event: &MonitorEvent) {
    if let Some(line) = event_line(event) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

fn event_line(event: &MonitorEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, TotalsDiff};

    #[test]
    fn event_line_is_single_line_json() {
        let mut changes = TotalsDiff::new();
        changes.insert("salesTotal".to_string(), Change::new(100, 150));
        let line = event_line(&MonitorEvent::TransactionsChanged {
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            timeframe: "Day".to_string(),
            changes,
        })
        .unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "transactions_changed");
        assert_eq!(value["changes"]["salesTotal"]["old"], 100);
        assert_eq!(value["changes"]["salesTotal"]["new"], 150);
    }
}
