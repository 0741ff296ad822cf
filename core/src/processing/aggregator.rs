use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowState {
    Scanning,
    WindowClosed,
}

/// Counts of the window that was open when a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub positive_count: u32,
    pub sweeps: u32,
    pub elapsed: Duration,
    pub window_duration: Duration,
    pub threshold: u32,
}

/// Emitted each time a window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowVerdict {
    pub index: usize,
    pub positive_count: u32,
    pub sweeps: u32,
    pub threshold: u32,
    pub detected: bool,
}

/// Positive sweeps counted over one time window.
#[derive(Debug, Clone, Copy)]
pub struct DetectionWindow {
    window_start: Instant,
    positive_count: u32,
    sweeps: u32,
    window_duration: Duration,
    threshold: u32,
}

impl DetectionWindow {
    pub fn open(now: Instant, window_duration: Duration, threshold: u32) -> Self {
        Self {
            window_start: now,
            positive_count: 0,
            sweeps: 0,
            window_duration,
            threshold,
        }
    }

    pub fn record(&mut self, positive: bool) {
        self.sweeps += 1;
        if positive {
            self.positive_count += 1;
        }
    }

    pub fn state(&self, now: Instant) -> WindowState {
        if now.saturating_duration_since(self.window_start) >= self.window_duration {
            WindowState::WindowClosed
        } else {
            WindowState::Scanning
        }
    }

    /// Emits the verdict and starts a fresh window at `now` once the current
    /// one has run its full duration.
    pub fn close_if_due(&mut self, now: Instant, index: usize) -> Option<WindowVerdict> {
        if self.state(now) == WindowState::Scanning {
            return None;
        }
        let verdict = WindowVerdict {
            index,
            positive_count: self.positive_count,
            sweeps: self.sweeps,
            threshold: self.threshold,
            detected: self.positive_count >= self.threshold,
        };
        *self = Self::open(now, self.window_duration, self.threshold);
        Some(verdict)
    }

    pub fn snapshot(&self, now: Instant) -> WindowSnapshot {
        WindowSnapshot {
            positive_count: self.positive_count,
            sweeps: self.sweeps,
            elapsed: now.saturating_duration_since(self.window_start),
            window_duration: self.window_duration,
            threshold: self.threshold,
        }
    }
}

/// Turns per-sweep booleans into window verdicts and a running total.
#[derive(Debug, Clone)]
pub struct DetectionAggregator {
    window: DetectionWindow,
    accumulated: u32,
    threshold: u32,
    closed: Vec<WindowVerdict>,
}

impl DetectionAggregator {
    pub fn new(now: Instant, window_duration: Duration, threshold: u32) -> Self {
        Self {
            window: DetectionWindow::open(now, window_duration, threshold),
            accumulated: 0,
            threshold,
            closed: Vec::new(),
        }
    }

    /// Records one analyzed sweep and closes the window if it is due.
    pub fn observe(&mut self, positive: bool, now: Instant) -> Option<WindowVerdict> {
        self.window.record(positive);
        if positive {
            self.accumulated += 1;
        }
        self.poll(now)
    }

    pub fn poll(&mut self, now: Instant) -> Option<WindowVerdict> {
        let verdict = self.window.close_if_due(now, self.closed.len())?;
        self.closed.push(verdict);
        Some(verdict)
    }

    pub fn state(&self, now: Instant) -> WindowState {
        self.window.state(now)
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn detected(&self) -> bool {
        self.accumulated >= self.threshold
    }

    pub fn windows(&self) -> &[WindowVerdict] {
        &self.closed
    }

    pub fn snapshot(&self, now: Instant) -> WindowSnapshot {
        self.window.snapshot(now)
    }

    /// Closed verdicts plus the window that is still open.
    pub fn finish(self, now: Instant) -> (Vec<WindowVerdict>, WindowSnapshot) {
        let open = self.window.snapshot(now);
        (self.closed, open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn run(sequence: &[bool], threshold: u32) -> (bool, Option<WindowVerdict>) {
        let start = Instant::now();
        let mut aggregator = DetectionAggregator::new(start, secs(10), threshold);
        for (i, &positive) in sequence.iter().enumerate() {
            assert!(aggregator
                .observe(positive, start + secs(i as u64 + 1))
                .is_none());
        }
        let verdict = aggregator.poll(start + secs(10));
        (aggregator.detected(), verdict)
    }

    #[test]
    fn three_of_four_meets_threshold_three() {
        let (detected, verdict) = run(&[true, false, true, true], 3);
        assert!(detected);
        let verdict = verdict.unwrap();
        assert!(verdict.detected);
        assert_eq!(verdict.positive_count, 3);
        assert_eq!(verdict.sweeps, 4);
    }

    #[test]
    fn three_of_four_misses_threshold_four() {
        let (detected, verdict) = run(&[true, false, true, true], 4);
        assert!(!detected);
        assert!(!verdict.unwrap().detected);
    }

    #[test]
    fn window_resets_after_closing() {
        let start = Instant::now();
        let mut aggregator = DetectionAggregator::new(start, secs(2), 2);
        assert!(aggregator.observe(true, start + secs(1)).is_none());
        assert_eq!(aggregator.state(start + secs(1)), WindowState::Scanning);

        let first = aggregator.observe(true, start + secs(2)).unwrap();
        assert_eq!((first.index, first.positive_count), (0, 2));
        assert!(first.detected);
        assert_eq!(aggregator.snapshot(start + secs(2)).positive_count, 0);

        assert!(aggregator.observe(false, start + secs(3)).is_none());
        let second = aggregator.observe(true, start + secs(4)).unwrap();
        assert_eq!((second.index, second.positive_count), (1, 1));
        assert!(!second.detected);

        assert_eq!(aggregator.accumulated(), 3);
        assert!(aggregator.detected());
        assert_eq!(aggregator.windows().len(), 2);
    }

    #[test]
    fn finish_surfaces_open_window() {
        let start = Instant::now();
        let mut aggregator = DetectionAggregator::new(start, secs(60), 1);
        aggregator.observe(true, start + secs(1));
        aggregator.observe(false, start + secs(2));
        let (closed, open) = aggregator.finish(start + secs(3));
        assert!(closed.is_empty());
        assert_eq!(open.positive_count, 1);
        assert_eq!(open.sweeps, 2);
        assert_eq!(open.elapsed, secs(3));
    }

    #[test]
    fn untouched_window_is_empty() {
        let start = Instant::now();
        let aggregator = DetectionAggregator::new(start, secs(5), 1);
        let (_, open) = aggregator.finish(start + secs(1));
        assert_eq!((open.sweeps, open.positive_count), (0, 0));
    }
}
