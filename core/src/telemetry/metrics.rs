use serde::Serialize;
use std::sync::Mutex;

/// Running totals for a sensor session, shared across scans.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sweeps: u64,
    pub positive_sweeps: u64,
    pub skipped_lines: u64,
    pub windows_closed: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub source_failures: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_sweep(&self, positive: bool, skipped_lines: usize) {
        self.update(|m| {
            m.sweeps += 1;
            m.positive_sweeps += u64::from(positive);
            m.skipped_lines += skipped_lines as u64;
        });
    }

    pub fn record_window(&self) {
        self.update(|m| m.windows_closed += 1);
    }

    pub fn record_sent(&self) {
        self.update(|m| m.messages_sent += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|m| m.messages_dropped += 1);
    }

    pub fn record_source_failure(&self) {
        self.update(|m| m.source_failures += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweeps_accumulate_positives_and_skips() {
        let metrics = MetricsRecorder::new();
        metrics.record_sweep(true, 2);
        metrics.record_sweep(false, 1);
        metrics.record_dropped();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweeps, 2);
        assert_eq!(snapshot.positive_sweeps, 1);
        assert_eq!(snapshot.skipped_lines, 3);
        assert_eq!(snapshot.messages_dropped, 1);
    }
}
