use crate::prelude::{ScanError, ScanResult, SignalAnalyzer};
use crate::processing::aggregator::{DetectionAggregator, WindowSnapshot, WindowVerdict};
use crate::processing::analyzer::ClusterReport;
use crate::processing::band_filter::BandFilter;
use crate::protocol::{Distributor, Payload};
use crate::sweep::channel::Channel;
use crate::sweep::matrix::{FrequencyPowerMatrix, MatrixBuilder};
use crate::sweep::source::SweepSource;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Time source for the scan loop.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Trips the cancellation signal of every scanner that subscribed to it.
#[derive(Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Checked by the scan loop between sweeps.
#[derive(Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: Arc::new(sender),
        },
        CancelSignal { receiver },
    )
}

/// Timing and relay settings for one scan attempt.
///
/// Windows of `window_secs` are closed and reported while the loop runs for
/// `budget_secs`; the final verdict compares every positive sweep of the
/// attempt against `threshold`. Setting the budget equal to the window gives
/// a single verdict for the whole scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub window_secs: f64,
    pub budget_secs: f64,
    pub threshold: u32,
    pub relay_raw_matrix: bool,
    pub relay_window_notices: bool,
    pub abort_on_send_failure: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            budget_secs: 5.0,
            threshold: 5,
            relay_raw_matrix: true,
            relay_window_notices: true,
            abort_on_send_failure: false,
        }
    }
}

impl ScanConfig {
    pub fn coarse(window_secs: f64, threshold: u32) -> Self {
        Self {
            window_secs,
            budget_secs: window_secs,
            threshold,
            ..Default::default()
        }
    }

    pub fn window(&self) -> Duration {
        seconds(self.window_secs)
    }

    pub fn budget(&self) -> Duration {
        seconds(self.budget_secs)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Everything one sweep produced on its way through the pipeline.
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub raw: FrequencyPowerMatrix,
    pub filtered: FrequencyPowerMatrix,
    pub report: ClusterReport,
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub channel: Channel,
    pub detected: bool,
    pub accumulated: u32,
    pub threshold: u32,
    pub sweeps: u32,
    pub skipped_lines: usize,
    pub messages_dropped: u32,
    pub windows: Vec<WindowVerdict>,
    /// The window still open when the loop stopped.
    pub open_window: WindowSnapshot,
    pub cancelled: bool,
}

/// Single-threaded sweep → filter → analyze → aggregate loop.
pub struct Scanner<S, A> {
    source: S,
    analyzer: A,
    distributor: Option<Distributor>,
    clock: Box<dyn Clock>,
    cancel: CancelSignal,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl<S: SweepSource, A: SignalAnalyzer> Scanner<S, A> {
    pub fn new(source: S, analyzer: A) -> Self {
        Self {
            source,
            analyzer,
            distributor: None,
            clock: Box::new(SystemClock),
            cancel: CancelSignal::never(),
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("scanner"),
        }
    }

    pub fn with_distributor(mut self, distributor: Distributor) -> Self {
        self.distributor = Some(distributor);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Scans `channel` for one window and reports whether at least
    /// `threshold` sweeps were positive.
    pub fn scan(&mut self, channel: u8, window_duration: f64, threshold: u32) -> ScanResult<bool> {
        let channel = Channel::from_index(channel)?;
        let outcome = self.run(&channel, &ScanConfig::coarse(window_duration, threshold))?;
        if outcome.cancelled {
            return Err(ScanError::Cancelled(outcome.open_window));
        }
        Ok(outcome.detected)
    }

    /// Fetches, parses, filters and analyzes one pass.
    pub fn sweep_once(&mut self, channel: &Channel) -> ScanResult<SweepResult> {
        let output = self.source.sweep(channel).map_err(|err| {
            self.metrics.record_source_failure();
            ScanError::from(err)
        })?;

        let mut builder = MatrixBuilder::new();
        builder.ingest_pass(&output);
        let skipped_lines = builder.skipped_lines();
        if skipped_lines > 0 {
            self.logger
                .warn(&format!("skipped {} malformed sweep lines", skipped_lines));
        }

        let raw = builder.finish();
        let filtered = BandFilter::new(*channel).apply(&raw);
        let report = self.analyzer.report(&filtered);
        Ok(SweepResult {
            raw,
            filtered,
            report,
            skipped_lines,
        })
    }

    pub fn run(&mut self, channel: &Channel, config: &ScanConfig) -> ScanResult<ScanOutcome> {
        let start = self.clock.now();
        let budget = config.budget();
        let mut aggregator = DetectionAggregator::new(start, config.window(), config.threshold);
        let mut sweeps = 0u32;
        let mut skipped_lines = 0usize;
        let mut dropped = 0u32;
        let mut cancelled = false;

        self.logger.record(&format!(
            "scanning {} with {} for {:.1}s ({:.1}s windows, threshold {})",
            channel,
            self.analyzer.name(),
            config.budget_secs,
            config.window_secs,
            config.threshold
        ));

        while self.clock.now().saturating_duration_since(start) < budget {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let sweep = self.sweep_once(channel)?;
            let positive = sweep.report.detected();
            sweeps += 1;
            skipped_lines += sweep.skipped_lines;
            self.metrics.record_sweep(positive, sweep.skipped_lines);

            if config.relay_raw_matrix {
                self.relay(&Payload::Matrix(sweep.raw), config, &mut dropped)?;
            }
            if let Some(verdict) = aggregator.observe(positive, self.clock.now()) {
                self.window_closed(channel, &verdict, config, &mut dropped)?;
            }
        }

        let end = self.clock.now();
        if aggregator.snapshot(end).sweeps > 0 {
            if let Some(verdict) = aggregator.poll(end) {
                self.window_closed(channel, &verdict, config, &mut dropped)?;
            }
        }

        let accumulated = aggregator.accumulated();
        let detected = aggregator.detected();
        let (windows, open_window) = aggregator.finish(end);
        if cancelled {
            self.logger.warn(&format!(
                "scan of {} cancelled with {} positive of {} sweeps in the open window",
                channel, open_window.positive_count, open_window.sweeps
            ));
        }

        Ok(ScanOutcome {
            channel: *channel,
            detected,
            accumulated,
            threshold: config.threshold,
            sweeps,
            skipped_lines,
            messages_dropped: dropped,
            windows,
            open_window,
            cancelled,
        })
    }

    fn window_closed(
        &self,
        channel: &Channel,
        verdict: &WindowVerdict,
        config: &ScanConfig,
        dropped: &mut u32,
    ) -> ScanResult<()> {
        self.metrics.record_window();
        let notice = format!(
            "{} window {}: {}/{} positive sweeps (threshold {}) -> {}",
            channel,
            verdict.index,
            verdict.positive_count,
            verdict.sweeps,
            verdict.threshold,
            if verdict.detected { "DETECTED" } else { "clear" }
        );
        self.logger.record(&notice);
        if config.relay_window_notices {
            self.relay(&Payload::Notice(notice), config, dropped)?;
        }
        Ok(())
    }

    /// Relay failures cost one message, not the scan, unless configured otherwise.
    fn relay(&self, payload: &Payload, config: &ScanConfig, dropped: &mut u32) -> ScanResult<()> {
        let Some(distributor) = &self.distributor else {
            return Ok(());
        };
        match distributor.distribute(payload) {
            Ok(()) => {
                self.metrics.record_sent();
                Ok(())
            }
            Err(err) => {
                *dropped += 1;
                self.metrics.record_dropped();
                if config.abort_on_send_failure {
                    return Err(err.into());
                }
                self.logger.warn(&format!("dropping message: {}", err));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::analyzer::ClusterAnalyzer;
    use crate::protocol::{Message, MessageKind, ProtocolError, Transport};
    use crate::sweep::fixtures::channel_eleven_pass;
    use crate::sweep::source::{ReplaySource, SourceError};
    use std::cell::Cell;
    use std::io;
    use std::sync::Mutex;

    /// Returns the current instant and then moves forward by `step`.
    struct SteppingClock {
        next: Cell<Instant>,
        step: Duration,
    }

    impl SteppingClock {
        fn boxed(step_secs: u64) -> Box<dyn Clock> {
            Box::new(Self {
                next: Cell::new(Instant::now()),
                step: Duration::from_secs(step_secs),
            })
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let now = self.next.get();
            self.next.set(now + self.step);
            now
        }
    }

    struct ScriptedAnalyzer {
        verdicts: Vec<bool>,
        cursor: Cell<usize>,
    }

    impl SignalAnalyzer for ScriptedAnalyzer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn report(&self, _matrix: &FrequencyPowerMatrix) -> ClusterReport {
            let index = self.cursor.get();
            self.cursor.set(index + 1);
            let positive = self.verdicts.get(index).copied().unwrap_or(false);
            ClusterReport {
                positives: if positive { vec![0] } else { Vec::new() },
                ..Default::default()
            }
        }
    }

    struct CancellingSource {
        inner: ReplaySource,
        handle: CancelHandle,
        after: usize,
        calls: usize,
    }

    impl SweepSource for CancellingSource {
        fn sweep(&mut self, channel: &Channel) -> Result<String, SourceError> {
            self.calls += 1;
            if self.calls == self.after {
                self.handle.cancel();
            }
            self.inner.sweep(channel)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Message>>>,
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, message: &Message) -> Result<(), ProtocolError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn deliver(&self, _message: &Message) -> Result<(), ProtocolError> {
            Err(ProtocolError::SendFailure {
                target: "receiver".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })
        }
    }

    fn replay(burst: bool) -> ReplaySource {
        ReplaySource::from_passes(vec![channel_eleven_pass(burst)])
    }

    fn scanner(burst: bool) -> Scanner<ReplaySource, ClusterAnalyzer> {
        Scanner::new(replay(burst), ClusterAnalyzer::default()).with_clock(SteppingClock::boxed(1))
    }

    fn quiet_config() -> ScanConfig {
        ScanConfig {
            relay_raw_matrix: false,
            relay_window_notices: false,
            ..ScanConfig::coarse(5.0, 1)
        }
    }

    #[test]
    fn injected_wide_burst_is_detected_on_channel_eleven() {
        assert!(scanner(true).scan(11, 5.0, 1).unwrap());
    }

    #[test]
    fn background_alone_is_not_detected_on_channel_eleven() {
        assert!(!scanner(false).scan(11, 5.0, 1).unwrap());
    }

    #[test]
    fn coarse_scan_closes_one_window() {
        let mut scanner = scanner(true);
        let channel = Channel::from_index(11).unwrap();
        let outcome = scanner.run(&channel, &quiet_config()).unwrap();
        assert_eq!(outcome.windows.len(), 1);
        assert_eq!(outcome.windows[0].positive_count, outcome.sweeps);
        assert_eq!(outcome.accumulated, outcome.sweeps);
        assert_eq!(outcome.open_window.sweeps, 0);
        assert_eq!(scanner.metrics().snapshot().positive_sweeps, outcome.sweeps as u64);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        assert!(matches!(
            scanner(true).scan(15, 5.0, 1),
            Err(ScanError::InvalidChannel(15))
        ));
    }

    #[test]
    fn failing_source_fails_the_attempt() {
        let mut scanner = Scanner::new(
            ReplaySource::from_passes(Vec::new()),
            ClusterAnalyzer::default(),
        )
        .with_clock(SteppingClock::boxed(1));
        assert!(matches!(
            scanner.scan(11, 5.0, 1),
            Err(ScanError::SourceUnavailable(SourceError::Exhausted))
        ));
        assert_eq!(scanner.metrics().snapshot().source_failures, 1);
    }

    #[test]
    fn fine_windows_report_every_interval() {
        let analyzer = ScriptedAnalyzer {
            verdicts: vec![true, false, true, true],
            cursor: Cell::new(0),
        };
        let mut scanner = Scanner::new(replay(false), analyzer).with_clock(SteppingClock::boxed(1));
        let config = ScanConfig {
            window_secs: 2.0,
            budget_secs: 8.0,
            threshold: 3,
            relay_raw_matrix: false,
            relay_window_notices: false,
            abort_on_send_failure: false,
        };
        let channel = Channel::from_index(11).unwrap();
        let outcome = scanner.run(&channel, &config).unwrap();

        let counts: Vec<u32> = outcome.windows.iter().map(|w| w.positive_count).collect();
        assert_eq!(counts, vec![1, 0, 1, 1]);
        assert!(outcome.windows.iter().all(|w| !w.detected));
        assert_eq!(outcome.accumulated, 3);
        assert!(outcome.detected);
    }

    #[test]
    fn cancellation_surfaces_the_open_window() {
        let (handle, signal) = cancellation();
        let source = CancellingSource {
            inner: replay(true),
            handle: handle.clone(),
            after: 2,
            calls: 0,
        };
        let mut scanner = Scanner::new(source, ClusterAnalyzer::default())
            .with_clock(SteppingClock::boxed(1))
            .with_cancel(signal);

        match scanner.scan(11, 60.0, 1) {
            Err(ScanError::Cancelled(snapshot)) => {
                assert_eq!(snapshot.sweeps, 2);
                assert_eq!(snapshot.positive_count, 2);
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn cancelled_before_start_runs_no_sweeps() {
        let (handle, signal) = cancellation();
        handle.cancel();
        let mut scanner = scanner(true).with_cancel(signal);
        let channel = Channel::from_index(11).unwrap();
        let outcome = scanner.run(&channel, &quiet_config()).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.sweeps, 0);
        assert!(outcome.windows.is_empty());
    }

    #[test]
    fn raw_matrices_and_window_notices_are_relayed() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut scanner =
            scanner(true).with_distributor(Distributor::new(Box::new(transport)));
        let channel = Channel::from_index(11).unwrap();
        let outcome = scanner
            .run(&channel, &ScanConfig::coarse(5.0, 1))
            .unwrap();

        let sent = sent.lock().unwrap();
        let frames = sent
            .iter()
            .filter(|m| m.kind() == MessageKind::DataFrame)
            .count();
        assert_eq!(frames as u32, outcome.sweeps);
        let notice = sent
            .iter()
            .find(|m| m.kind() == MessageKind::TextNotice)
            .unwrap();
        match notice.decode().unwrap() {
            Payload::Notice(text) => assert!(text.ends_with("DETECTED")),
            other => panic!("unexpected payload {:?}", other),
        }
        match sent[0].decode().unwrap() {
            Payload::Matrix(matrix) => assert_eq!(matrix.len(), 250),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn relay_failures_are_dropped_by_default() {
        let mut scanner =
            scanner(true).with_distributor(Distributor::new(Box::new(RefusingTransport)));
        let channel = Channel::from_index(11).unwrap();
        let outcome = scanner
            .run(&channel, &ScanConfig::coarse(5.0, 1))
            .unwrap();
        assert!(outcome.detected);
        assert!(outcome.messages_dropped > 0);
        assert_eq!(
            scanner.metrics().snapshot().messages_dropped,
            u64::from(outcome.messages_dropped)
        );
    }

    #[test]
    fn relay_failures_abort_when_configured() {
        let mut scanner =
            scanner(true).with_distributor(Distributor::new(Box::new(RefusingTransport)));
        let channel = Channel::from_index(11).unwrap();
        let config = ScanConfig {
            abort_on_send_failure: true,
            ..ScanConfig::coarse(5.0, 1)
        };
        assert!(matches!(
            scanner.run(&channel, &config),
            Err(ScanError::Distribution(ProtocolError::SendFailure { .. }))
        ));
    }
}
