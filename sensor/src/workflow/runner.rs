use crate::generator::profile::SyntheticSource;
use crate::workflow::config::{SensorConfig, SourceKind};
use anyhow::Context;
use std::sync::Arc;
use std::thread;
use sweepcore::prelude::{ScanError, SignalAnalyzer};
use sweepcore::processing::{CancelSignal, ScanOutcome, Scanner};
use sweepcore::protocol::Distributor;
use sweepcore::sweep::{HackrfSweep, ReplaySource, SweepSource};
use sweepcore::telemetry::{MetricsRecorder, MetricsSnapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempts: u32,
    pub detections: u32,
    pub source_failures: u32,
    pub cancelled: bool,
}

/// Drives repeated scan attempts on the configured channel.
pub struct Runner {
    config: SensorConfig,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn build_source(&self) -> anyhow::Result<Box<dyn SweepSource>> {
        let source: Box<dyn SweepSource> = match &self.config.source {
            SourceKind::Hackrf => Box::new(HackrfSweep::new(self.config.hackrf.clone())),
            SourceKind::Synthetic => Box::new(SyntheticSource::new(self.config.synthetic.clone())),
            SourceKind::Replay(path) => Box::new(
                ReplaySource::load(path)
                    .with_context(|| format!("loading replay source {}", path.display()))?,
            ),
        };
        Ok(source)
    }

    pub fn run(&self, cancel: CancelSignal) -> anyhow::Result<RunSummary> {
        let source = self.build_source()?;
        self.run_with(source, cancel)
    }

    pub fn run_with(
        &self,
        source: Box<dyn SweepSource>,
        cancel: CancelSignal,
    ) -> anyhow::Result<RunSummary> {
        let channel = self.config.channel()?;
        let analyzer = self.config.analyzer.build();
        log::debug!("analyzing sweeps with {}", analyzer.name());
        let mut scanner = Scanner::new(source, analyzer)
            .with_cancel(cancel.clone())
            .with_metrics(self.metrics.clone());
        if let Some(receiver) = &self.config.receiver {
            scanner = scanner.with_distributor(Distributor::one_shot(
                receiver.clone(),
                self.config.connect_timeout(),
            ));
        }

        let mut summary = RunSummary::default();
        while self.config.repeat == 0 || summary.attempts < self.config.repeat {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.attempts += 1;

            match scanner.run(&channel, &self.config.scan) {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    if outcome.detected {
                        summary.detections += 1;
                    }
                    if outcome.cancelled {
                        summary.cancelled = true;
                        break;
                    }
                }
                Err(ScanError::SourceUnavailable(err)) => {
                    summary.source_failures += 1;
                    log::warn!(
                        "sweep source unavailable: {}; retrying in {:?}",
                        err,
                        self.config.retry_delay()
                    );
                    thread::sleep(self.config.retry_delay());
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("scan attempt {} failed", summary.attempts))
                }
            }
        }
        Ok(summary)
    }
}

fn print_outcome(outcome: &ScanOutcome) {
    println!(
        "{} -> {} ({} positive of {} sweeps, threshold {})",
        outcome.channel,
        if outcome.detected { "DETECTED" } else { "clear" },
        outcome.accumulated,
        outcome.sweeps,
        outcome.threshold
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::SyntheticConfig;
    use std::path::PathBuf;
    use sweepcore::processing::cancellation;

    fn synthetic(burst_probability: f64, repeat: u32) -> SensorConfig {
        let mut cfg = SensorConfig::from_args(11, 0.05, None, 1, repeat, SourceKind::Synthetic, None);
        cfg.synthetic = SyntheticConfig {
            seed: 3,
            burst_probability,
            ..Default::default()
        };
        cfg
    }

    #[test]
    fn runner_detects_synthetic_bursts() {
        let runner = Runner::new(synthetic(1.0, 2));
        let summary = runner.run(CancelSignal::never()).unwrap();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.detections, 2);
        assert!(runner.metrics().positive_sweeps >= 2);
    }

    #[test]
    fn runner_stays_quiet_on_the_floor() {
        let runner = Runner::new(synthetic(0.0, 1));
        let summary = runner.run(CancelSignal::never()).unwrap();
        assert_eq!(summary.detections, 0);
        assert_eq!(runner.metrics().positive_sweeps, 0);
    }

    #[test]
    fn source_failures_are_retried() {
        let mut cfg = synthetic(0.0, 3);
        cfg.retry_delay_ms = 0;
        let runner = Runner::new(cfg);
        let summary = runner
            .run_with(
                Box::new(ReplaySource::from_passes(Vec::new())),
                CancelSignal::never(),
            )
            .unwrap();
        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.source_failures, 3);
        assert_eq!(runner.metrics().source_failures, 3);
    }

    #[test]
    fn cancelled_runner_stops_before_scanning() {
        let (handle, signal) = cancellation();
        handle.cancel();
        let runner = Runner::new(synthetic(1.0, 0));
        let summary = runner.run(signal).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.attempts, 0);
    }

    #[test]
    fn missing_replay_file_is_reported() {
        let mut cfg = synthetic(0.0, 1);
        cfg.source = SourceKind::Replay(PathBuf::from("/nonexistent/sweeps.txt"));
        assert!(Runner::new(cfg).run(CancelSignal::never()).is_err());
    }
}
