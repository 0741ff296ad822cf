pub mod aggregator;
pub mod analyzer;
pub mod band_filter;
pub mod hdbscan;
pub mod mixture;
pub mod scanner;

pub use aggregator::{DetectionAggregator, DetectionWindow, WindowSnapshot, WindowState, WindowVerdict};
pub use analyzer::{
    AnalyzerBackend, AnalyzerConfig, Cluster, ClusterAnalyzer, ClusterReport, MixtureAnalyzer,
    SignatureCriteria, ThresholdStrategy,
};
pub use band_filter::BandFilter;
pub use scanner::{
    cancellation, CancelHandle, CancelSignal, Clock, ScanConfig, ScanOutcome, Scanner,
    SweepResult, SystemClock,
};
